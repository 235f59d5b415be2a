use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};

use std::fs;

#[cfg(not(target_arch = "wasm32"))]
fn home_dir() -> Utf8PathBuf {
    home::home_dir()
        .and_then(|home| Utf8PathBuf::from_path_buf(home).ok())
        .unwrap_or_else(|| Utf8PathBuf::from("."))
}

#[cfg(not(target_arch = "wasm32"))]
pub fn apl_default_dir() -> Utf8PathBuf {
    home_dir().join(Utf8Path::new(".apl"))
}

#[cfg(target_arch = "wasm32")]
pub fn apl_default_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(".apl")
}

pub(crate) fn create_apl_dir() -> Result<()> {
    fs::create_dir_all(apl_default_dir())?;
    Ok(())
}

// Not currently configurable
pub(crate) fn repl_history() -> Utf8PathBuf {
    apl_default_dir().join(Utf8Path::new("repl-history"))
}
