use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use filetime::FileTime;

use crate::meta::Target;

/// Shared libraries in `<output_dir>/<abi>/` written at or after `since`.
pub fn produced_libraries(output_dir: &Path, targets: &[Target], since: FileTime) -> Vec<PathBuf> {
    let mut found = targets
        .iter()
        .map(|target| output_dir.join(target.to_string()))
        .filter_map(|dir| std::fs::read_dir(dir).ok())
        .flat_map(|entries| entries.flat_map(Result::ok))
        .map(|entry| entry.path())
        .filter(|path| path.extension() == Some(OsStr::new("so")))
        .filter(|path| {
            std::fs::metadata(path)
                .map(|meta| FileTime::from_last_modification_time(&meta) >= since)
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();
    found.sort();
    found
}
