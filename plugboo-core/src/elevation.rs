use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use tracing::debug;

#[cfg(windows)]
mod imp {
    use windows::Win32::{
        Foundation::{CloseHandle, HANDLE},
        Security::{GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY},
        System::Threading::{GetCurrentProcess, OpenProcessToken},
    };

    /// Access token of the current process, closed on drop.
    struct ProcessToken(HANDLE);

    impl ProcessToken {
        fn open() -> Option<Self> {
            let mut handle = HANDLE::default();
            // SAFETY: the pseudo-handle of the current process is always valid.
            unsafe { OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut handle) }.ok()?;
            Some(Self(handle))
        }

        fn elevation(&self) -> Option<TOKEN_ELEVATION> {
            let mut elevation = TOKEN_ELEVATION::default();
            let mut written = 0u32;
            // SAFETY: the buffer is a TOKEN_ELEVATION and its size is passed alongside.
            unsafe {
                GetTokenInformation(
                    self.0,
                    TokenElevation,
                    Some(&mut elevation as *mut TOKEN_ELEVATION as *mut _),
                    std::mem::size_of::<TOKEN_ELEVATION>() as u32,
                    &mut written,
                )
            }
            .ok()?;
            Some(elevation)
        }
    }

    impl Drop for ProcessToken {
        fn drop(&mut self) {
            // SAFETY: the handle came from OpenProcessToken and is closed once.
            let _ = unsafe { CloseHandle(self.0) };
        }
    }

    pub fn query_elevated() -> bool {
        ProcessToken::open().and_then(|t| t.elevation()).is_some_and(|e| e.TokenIsElevated != 0)
    }
}

#[cfg(unix)]
mod imp {
    pub fn query_elevated() -> bool {
        nix::unistd::geteuid().is_root()
    }
}

static ELEVATED: Lazy<bool> = Lazy::new(|| {
    let elevated = imp::query_elevated();
    debug!("process elevated: {}", elevated);
    elevated
});

/// Whether this process already has administrator (or root) rights. Queried once.
pub fn is_elevated() -> bool {
    *ELEVATED
}

/// Command line that starts a program with administrator rights in a given directory.
/// When the current process is already elevated the program is run directly; otherwise
/// the platform's elevation front-end wraps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

#[cfg(windows)]
fn ps_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

impl LaunchPlan {
    pub fn elevated(exe: &Path, cwd: &Path) -> Self {
        Self::for_elevation(exe, cwd, is_elevated())
    }

    pub fn for_elevation(exe: &Path, cwd: &Path, already_elevated: bool) -> Self {
        if already_elevated {
            return Self { program: exe.to_path_buf(), args: Vec::new(), cwd: cwd.to_path_buf() };
        }
        Self::wrapped(exe, cwd)
    }

    // Start-Process does not hand back the child's streams; the exit code is forwarded.
    #[cfg(windows)]
    fn wrapped(exe: &Path, cwd: &Path) -> Self {
        let script = format!(
            "$p = Start-Process -FilePath {} -WorkingDirectory {} -Verb RunAs -PassThru -Wait; exit $p.ExitCode",
            ps_quote(&exe.display().to_string()),
            ps_quote(&cwd.display().to_string()),
        );
        Self {
            program: PathBuf::from("powershell.exe"),
            args: vec!["-NoProfile".into(), "-NonInteractive".into(), "-Command".into(), script],
            cwd: cwd.to_path_buf(),
        }
    }

    #[cfg(unix)]
    fn wrapped(exe: &Path, cwd: &Path) -> Self {
        // pkexec resets the working directory, so the shell changes into it first.
        Self {
            program: PathBuf::from("pkexec"),
            args: vec![
                "sh".into(),
                "-c".into(),
                r#"cd "$1" && exec "$2""#.into(),
                "sh".into(),
                cwd.display().to_string(),
                exe.display().to_string(),
            ],
            cwd: cwd.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elevated_process_runs_program_directly() {
        let plan = LaunchPlan::for_elevation(Path::new("/p/Loader.exe"), Path::new("/p"), true);
        assert_eq!(plan.program, PathBuf::from("/p/Loader.exe"));
        assert!(plan.args.is_empty());
        assert_eq!(plan.cwd, PathBuf::from("/p"));
    }

    #[cfg(unix)]
    #[test]
    fn elevation_matches_effective_user_and_is_stable() {
        assert_eq!(is_elevated(), nix::unistd::geteuid().is_root());
        assert_eq!(is_elevated(), imp::query_elevated());
        let plan = LaunchPlan::elevated(Path::new("/p/Loader.exe"), Path::new("/p"));
        assert_eq!(plan.program == PathBuf::from("pkexec"), !is_elevated());
    }

    #[cfg(unix)]
    #[test]
    fn unelevated_unix_goes_through_pkexec() {
        let plan = LaunchPlan::for_elevation(Path::new("/p/3DMigoto Loader.exe"), Path::new("/p"), false);
        assert_eq!(plan.program, PathBuf::from("pkexec"));
        assert_eq!(plan.args.last().map(String::as_str), Some("/p/3DMigoto Loader.exe"));
        assert_eq!(plan.args[4], "/p");
    }

    #[cfg(windows)]
    #[test]
    fn unelevated_windows_uses_runas() {
        let plan = LaunchPlan::for_elevation(Path::new(r"C:\it's\Loader.exe"), Path::new(r"C:\it's"), false);
        assert_eq!(plan.program, PathBuf::from("powershell.exe"));
        assert!(plan.args[3].contains("-Verb RunAs"));
        assert!(plan.args[3].contains(r"'C:\it''s\Loader.exe'"));
    }
}
