//! Hands a rendered image to the platform's default viewer.

use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::debug;

use crate::error::{Result, TraceError};

/// Where a chart is written when it should be shown but not kept.
///
/// The name is fixed, so each shown-only run replaces the previous preview
/// instead of leaving another file in the temp directory.
pub fn scratch_path() -> PathBuf {
    env::temp_dir().join("convplot-preview.png")
}

/// Opens `path` without waiting for the viewer to exit.
pub fn open_in_viewer(path: &Path) -> Result<()> {
    let mut command = viewer_command(path);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    debug!("launching {:?}", command);
    command
        .spawn()
        .map(|_child| ())
        .map_err(|e| TraceError::io(path, e))
}

fn viewer_command(path: &Path) -> Command {
    if cfg!(target_os = "macos") {
        let mut c = Command::new("open");
        c.arg(path);
        c
    } else if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", ""]).arg(path);
        c
    } else {
        let mut c = Command::new("xdg-open");
        c.arg(path);
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_targets_the_image() {
        let command = viewer_command(Path::new("plot.png"));
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args.last().and_then(|a| a.to_str()), Some("plot.png"));
        if cfg!(target_os = "linux") {
            assert_eq!(command.get_program(), "xdg-open");
        }
    }

    #[test]
    fn scratch_images_are_png() {
        assert_eq!(
            scratch_path().extension().and_then(|e| e.to_str()),
            Some("png")
        );
    }

    #[test]
    fn scratch_path_is_reused_across_runs() {
        assert_eq!(scratch_path(), scratch_path());
        assert_eq!(scratch_path().parent(), Some(env::temp_dir().as_path()));
    }
}
