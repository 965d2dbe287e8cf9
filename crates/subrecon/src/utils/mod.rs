pub mod log;

use crate::Result;
use std::fs;
use std::path::Path;

/// Creates `dir` when missing, returns whether it had to be created.
pub fn ensure_dir(dir: &Path) -> Result<bool> {
    if dir.is_dir() {
        Ok(false)
    } else {
        fs::create_dir_all(dir)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_nested_dirs_once() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("a/b");
        assert_eq!(true, ensure_dir(&dir).unwrap());
        assert_eq!(false, ensure_dir(&dir).unwrap());
    }
}
