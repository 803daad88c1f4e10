pub mod app;
pub mod renderer;
pub mod resources;

use color_eyre::Result;
use winit::event_loop::{ControlFlow, EventLoop};

use app::App;
use app::engine::Engine;

fn main() -> Result<()> {
    color_eyre::install()?;

    // The engine configures the logger itself from the settings file,
    // so there is no bare env_logger::init() here.
    let engine = Engine::bootstrap()?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(engine);
    event_loop.run_app(&mut app)?;

    app.finish()?;

    Ok(())
}
