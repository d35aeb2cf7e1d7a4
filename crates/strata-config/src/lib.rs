pub mod error;

pub use error::*;

use std::path::{Path, PathBuf};

/// Environment variable naming a stack file directly
pub const STACK_PATH_ENV: &str = "STRATA_STACK_PATH";

/// Project-local directory holding state, lock and optionally the stack file
pub const PROJECT_DIR: &str = ".strata";

const CANDIDATES: [&str; 4] = ["stack.local.kdl", ".stack.local.kdl", "stack.kdl", ".stack.kdl"];

/// Strata's configuration directory (`~/.config/strata`), created on demand.
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("strata");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Find the stack file to load.
///
/// Search order:
/// 1. `STRATA_STACK_PATH`
/// 2. current directory: stack.local.kdl, .stack.local.kdl, stack.kdl, .stack.kdl
/// 3. the same names under `./.strata/`
/// 4. `~/.config/strata/stack.kdl`
pub fn find_stack_file() -> Result<PathBuf> {
    if let Ok(stack_path) = std::env::var(STACK_PATH_ENV) {
        let path = PathBuf::from(&stack_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::StackPathMissing(stack_path));
    }

    let current_dir = std::env::current_dir()?;
    if let Some(path) = find_in_dir(&current_dir) {
        return Ok(path);
    }

    let project_dir = current_dir.join(PROJECT_DIR);
    if project_dir.is_dir()
        && let Some(path) = find_in_dir(&project_dir)
    {
        return Ok(path);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("strata").join("stack.kdl");
        if global.exists() {
            return Ok(global);
        }
    }

    Err(ConfigError::StackFileNotFound)
}

fn find_in_dir(dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

/// Directory whose `.strata/` holds the state for `stack_file`.
///
/// A stack file inside `.strata/` belongs to the directory above it.
pub fn project_root_for(stack_file: &Path) -> PathBuf {
    let parent = stack_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    if parent.file_name().and_then(|n| n.to_str()) == Some(PROJECT_DIR) {
        parent.parent().unwrap_or(parent).to_path_buf()
    } else {
        parent.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    struct CwdGuard(PathBuf);

    impl CwdGuard {
        fn enter(dir: &Path) -> Self {
            let original = std::env::current_dir().unwrap();
            std::env::set_current_dir(dir).unwrap();
            Self(original)
        }
    }

    impl Drop for CwdGuard {
        fn drop(&mut self) {
            let _ = std::env::set_current_dir(&self.0);
        }
    }

    #[test]
    #[serial]
    fn test_find_stack_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("stack.kdl"), "// test").unwrap();
        let _cwd = CwdGuard::enter(temp_dir.path());

        let found = find_stack_file().unwrap();
        assert!(found.ends_with("stack.kdl"));
    }

    #[test]
    #[serial]
    fn test_local_file_takes_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("stack.kdl"), "// shared").unwrap();
        fs::write(temp_dir.path().join("stack.local.kdl"), "// local").unwrap();
        let _cwd = CwdGuard::enter(temp_dir.path());

        assert!(find_stack_file().unwrap().ends_with("stack.local.kdl"));
    }

    #[test]
    #[serial]
    fn test_find_stack_file_in_project_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let project_dir = temp_dir.path().join(PROJECT_DIR);
        fs::create_dir(&project_dir).unwrap();
        fs::write(project_dir.join("stack.kdl"), "// nested").unwrap();
        let _cwd = CwdGuard::enter(temp_dir.path());

        assert!(find_stack_file().unwrap().ends_with(".strata/stack.kdl"));
    }

    #[test]
    #[serial]
    fn test_env_var_wins() {
        let temp_dir = tempfile::tempdir().unwrap();
        let custom = temp_dir.path().join("custom.kdl");
        fs::write(&custom, "// custom").unwrap();

        unsafe {
            std::env::set_var(STACK_PATH_ENV, custom.to_str().unwrap());
        }
        let result = find_stack_file();
        unsafe {
            std::env::remove_var(STACK_PATH_ENV);
        }

        assert_eq!(result.unwrap(), custom);
    }

    #[test]
    #[serial]
    fn test_env_var_pointing_nowhere_is_an_error() {
        unsafe {
            std::env::set_var(STACK_PATH_ENV, "/no/such/stack.kdl");
        }
        let result = find_stack_file();
        unsafe {
            std::env::remove_var(STACK_PATH_ENV);
        }

        assert!(matches!(result, Err(ConfigError::StackPathMissing(_))));
    }

    #[test]
    fn test_project_root_for() {
        assert_eq!(
            project_root_for(Path::new("/work/app/stack.kdl")),
            PathBuf::from("/work/app")
        );
        assert_eq!(
            project_root_for(Path::new("/work/app/.strata/stack.kdl")),
            PathBuf::from("/work/app")
        );
        assert_eq!(project_root_for(Path::new("stack.kdl")), PathBuf::from("."));
    }
}
