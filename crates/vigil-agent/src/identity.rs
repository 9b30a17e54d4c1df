use std::fs;
use std::io;
use std::path::Path;

use uuid::Uuid;

/// Returns the stable device identifier, generating and persisting one on
/// first run (hostname when available, otherwise a random UUID).
pub fn resolve_device_id(path: &Path) -> io::Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let id = content.trim();
            if !id.is_empty() {
                return Ok(id.to_string());
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let id = vigil_collector::hostname().unwrap_or_else(|| Uuid::new_v4().to_string());
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, &id)?;
    tracing::info!(device_id = %id, path = %path.display(), "generated device identity");
    Ok(id)
}
