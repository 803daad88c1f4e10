pub mod camera_controller;
pub mod engine;
pub mod input_queue;
pub mod settings;

use std::sync::Arc;

use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Fullscreen, Window, WindowId};

use engine::{Engine, EngineError};
use input_queue::InputQueue;

/// Event-loop glue around the engine: creates the window, feeds the input
/// queue, and runs one engine tick per loop iteration.
pub struct App {
    engine: Engine,
    window: Option<Arc<Window>>,
    input: InputQueue,
    failure: Option<EngineError>,
}

impl App {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            window: None,
            input: InputQueue::default(),
            failure: None,
        }
    }

    /// Runs the shutdown phase and reports whether the loop ended cleanly.
    pub fn finish(mut self) -> Result<(), EngineError> {
        self.engine.shutdown();
        match self.failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: EngineError) {
        log::error!("{err}");
        self.failure = Some(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let settings = self.engine.settings();
            let mut attributes = Window::default_attributes()
                .with_title("firstlight")
                .with_inner_size(PhysicalSize::new(
                    settings.window_width,
                    settings.window_height,
                ));
            if settings.window_is_fullscreen {
                attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
            }

            match event_loop.create_window(attributes) {
                Ok(window) => self.window = Some(Arc::new(window)),
                Err(err) => {
                    self.fail(event_loop, EngineError::Window(err.to_string()));
                    return;
                }
            }
        }

        if let Some(window) = self.window.clone() {
            if let Err(err) = self.engine.initialize_graphics(&window) {
                self.fail(event_loop, err);
            }
        }
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window_id != window.id() {
            return;
        }

        if let WindowEvent::Resized(size) = &event {
            // Swapchain recreation is not supported; the drawable area stays
            // at its creation size.
            log::debug!("window resized to {}x{}", size.width, size.height);
        }

        self.input.push_window_event(&event);
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        for event in self.input.drain() {
            self.engine.handle_event(event);
        }

        if self.engine.quit_requested() {
            event_loop.exit();
            return;
        }

        if let Err(err) = self.engine.tick() {
            self.fail(event_loop, err);
            return;
        }

        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}
