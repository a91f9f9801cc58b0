//! Log directory resolution.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Default log root: `$HOME/.local/share/diaglog/logs`, or `/tmp/diaglog/logs`
/// when `HOME` is unset.
pub fn default_log_dir() -> PathBuf {
    let home = env::var_os("HOME").map_or_else(
        || {
            tracing::warn!("HOME not set, falling back to /tmp for the log directory");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    );
    if home == Path::new("/tmp") {
        return home.join("diaglog").join("logs");
    }
    home.join(".local").join("share").join("diaglog").join("logs")
}

/// Default config file: `$HOME/.config/diaglog/config.toml`.
pub fn default_config_file() -> PathBuf {
    let home = env::var_os("HOME").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
    home.join(".config").join("diaglog").join("config.toml")
}

/// Make `path` absolute and strip `.`/`..` components.
///
/// The log directory usually does not exist yet when the config is loaded,
/// so this never touches the filesystem.
pub fn absolutize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    let mut components = Vec::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}
