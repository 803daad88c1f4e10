use std::collections::BTreeMap;
use std::fs::File;
use std::path::PathBuf;

use crate::renderer::device::LoadedShader;

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("this path is not accessible: {path}: {source}")]
    InputOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("these shaders do not exist and have not been loaded: {0}")]
    ShaderLoad(String),

    #[error("these shaders have not been loaded: {0}")]
    ShaderReceive(String),
}

/// Loads shader bytecode by name from a filesystem search root and hands it
/// out to the graphics device during environment creation.
pub struct ResourceManager {
    shader_search_root: PathBuf,
    shaders: BTreeMap<String, Vec<u32>>,
}

impl ResourceManager {
    pub fn new(shader_search_root: impl Into<PathBuf>) -> Self {
        Self {
            shader_search_root: shader_search_root.into(),
            shaders: BTreeMap::new(),
        }
    }

    /// Reads SPIR-V for every requested name under the search root. Names
    /// without a file are collected and reported together; a file that exists
    /// but cannot be read aborts immediately with its path.
    pub fn load_shaders(&mut self, names: &[&str]) -> Result<(), ResourceError> {
        let mut missing = Vec::new();

        for &name in names {
            let path = self.shader_search_root.join(name);
            if !path.is_file() {
                missing.push(name);
                continue;
            }

            let mut file = File::open(&path).map_err(|source| ResourceError::InputOpen {
                path: path.clone(),
                source,
            })?;
            let code = ash::util::read_spv(&mut file).map_err(|source| {
                ResourceError::InputOpen {
                    path: path.clone(),
                    source,
                }
            })?;

            log::debug!("shader loaded: {} ({} words)", path.display(), code.len());
            self.shaders.insert(name.to_owned(), code);
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ResourceError::ShaderLoad(missing.join(" ")))
        }
    }

    /// Resolves previously loaded bytecode by name; every unresolvable name
    /// is reported in one aggregate error.
    pub fn shader_bytecode<'s>(
        &'s self,
        names: &[&'s str],
    ) -> Result<Vec<LoadedShader<'s>>, ResourceError> {
        let mut resolved = Vec::with_capacity(names.len());
        let mut missing = Vec::new();

        for &name in names {
            match self.shaders.get(name) {
                Some(code) => resolved.push(LoadedShader { name, code }),
                None => missing.push(name),
            }
        }

        if missing.is_empty() {
            Ok(resolved)
        } else {
            Err(ResourceError::ShaderReceive(missing.join(" ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "firstlight-resources-{tag}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_spv(dir: &Path, name: &str, words: &[u32]) {
        let bytes = words
            .iter()
            .flat_map(|word| word.to_le_bytes())
            .collect::<Vec<u8>>();
        fs::write(dir.join(name), bytes).unwrap();
    }

    // SPIR-V magic followed by a few zero words.
    const WORDS: &[u32] = &[0x0723_0203, 0, 0, 0];

    #[test]
    fn loads_and_resolves_bytecode() {
        let dir = scratch_dir("ok");
        write_spv(&dir, "a.spv", WORDS);
        write_spv(&dir, "b.spv", WORDS);

        let mut manager = ResourceManager::new(&dir);
        manager.load_shaders(&["a.spv", "b.spv"]).unwrap();

        let resolved = manager.shader_bytecode(&["a.spv", "b.spv"]).unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].name, "a.spv");
        assert_eq!(resolved[0].code, WORDS);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_files_are_reported_together() {
        let dir = scratch_dir("missing");
        write_spv(&dir, "present.spv", WORDS);

        let mut manager = ResourceManager::new(&dir);
        let err = manager
            .load_shaders(&["present.spv", "gone.spv", "also_gone.spv"])
            .unwrap_err();
        match err {
            ResourceError::ShaderLoad(names) => assert_eq!(names, "gone.spv also_gone.spv"),
            other => panic!("unexpected error: {other:?}"),
        }

        // The present one was still loaded despite the aggregate failure.
        assert!(manager.shader_bytecode(&["present.spv"]).is_ok());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unresolved_names_are_reported_together() {
        let manager = ResourceManager::new("nowhere");
        let err = manager.shader_bytecode(&["x.spv", "y.spv"]).unwrap_err();
        match err {
            ResourceError::ShaderReceive(names) => assert_eq!(names, "x.spv y.spv"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
