//! Renderer discovery: find the Marp executable, a Chromium browser, and an
//! optional theme directory.
//!
//! Discovery order for each tool is: explicit configuration, an environment
//! variable, a bundled copy next to the running executable, then well-known
//! install locations. The result is a [`Renderer`] that the probe and the
//! exporter share, so both see the same binaries and environment.

use crate::config::ConversionConfig;
use crate::error::AutosplitError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Environment variable overriding the Marp executable.
pub const MARP_ENV: &str = "MARP_BIN";
/// Environment variable Marp itself reads to find the browser.
pub const BROWSER_ENV: &str = "CHROME_PATH";

/// Everything needed to launch the external renderer.
#[derive(Debug, Clone)]
pub struct Renderer {
    pub marp: PathBuf,
    pub browser: PathBuf,
    /// Directory passed as `--theme-set`.
    pub theme_set: Option<PathBuf>,
    /// Extra browser flags for measurement runs.
    pub browser_args: Vec<String>,
    /// Parent of temporary probe workspaces.
    pub work_dir: Option<PathBuf>,
    /// Bound on each external invocation.
    pub timeout: Duration,
    /// Variables set on top of the inherited environment.
    pub env: Vec<(String, OsString)>,
}

impl Renderer {
    /// Locate every tool, honouring explicit paths in `config`.
    ///
    /// # Errors
    /// [`AutosplitError::RendererUnavailable`] when Marp or the browser
    /// cannot be found. Nothing is launched here.
    pub fn discover(config: &ConversionConfig) -> Result<Self, AutosplitError> {
        let marp = match &config.marp_path {
            Some(p) => existing(p, "Marp CLI")?,
            None => find_marp_executable().ok_or_else(|| AutosplitError::RendererUnavailable {
                what: "Marp CLI".into(),
                hint: format!(
                    "Install it with `npm install -g @marp-team/marp-cli`, or set {MARP_ENV} / --marp."
                ),
            })?,
        };
        let browser = match &config.browser_path {
            Some(p) => existing(p, "Chrome/Edge browser")?,
            None => find_browser_path().ok_or_else(|| AutosplitError::RendererUnavailable {
                what: "Chrome/Edge browser".into(),
                hint: format!("Install Google Chrome or Microsoft Edge, or set {BROWSER_ENV} / --browser."),
            })?,
        };
        let theme_set = config
            .theme_set
            .clone()
            .or_else(|| base_dir().map(|d| d.join("themes")).filter(|d| d.is_dir()));

        info!("Marp: {}", marp.display());
        info!("Browser: {}", browser.display());
        if let Some(t) = &theme_set {
            info!("Theme set: {}", t.display());
        }

        let env = renderer_env(&browser);
        Ok(Self {
            marp,
            browser,
            theme_set,
            browser_args: config.browser_args.clone(),
            work_dir: config.work_dir.clone(),
            timeout: Duration::from_secs(config.renderer_timeout_secs),
            env,
        })
    }

    /// A `marp` command with the renderer environment applied.
    pub fn marp_command(&self) -> Command {
        let mut cmd = Command::new(&self.marp);
        cmd.envs(self.env.iter().map(|(k, v)| (k, v)));
        cmd
    }

    /// A browser command with the renderer environment applied.
    pub fn browser_command(&self) -> Command {
        let mut cmd = Command::new(&self.browser);
        cmd.envs(self.env.iter().map(|(k, v)| (k, v)));
        cmd
    }
}

fn existing(path: &Path, what: &str) -> Result<PathBuf, AutosplitError> {
    if path.exists() {
        Ok(path.to_path_buf())
    } else {
        Err(AutosplitError::RendererUnavailable {
            what: what.to_string(),
            hint: format!("Configured path does not exist: {}", path.display()),
        })
    }
}

/// Directory holding the running executable, where bundled tools live.
fn base_dir() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let exe = exe.canonicalize().unwrap_or(exe);
    exe.parent().map(Path::to_path_buf)
}

fn platform_dir() -> &'static str {
    if cfg!(windows) {
        "windows"
    } else if cfg!(target_os = "macos") {
        "macos"
    } else {
        "linux"
    }
}

fn marp_file_name() -> &'static str {
    if cfg!(windows) {
        "marp.exe"
    } else {
        "marp"
    }
}

/// Find Marp: `$MARP_BIN`, then `<exe dir>/bin/<platform>/marp`, then `PATH`.
pub fn find_marp_executable() -> Option<PathBuf> {
    if let Some(p) = std::env::var_os(MARP_ENV).map(PathBuf::from) {
        if p.exists() {
            debug!("Marp from {}: {}", MARP_ENV, p.display());
            return Some(p);
        }
    }

    if let Some(bundled) = base_dir().map(|d| d.join("bin").join(platform_dir()).join(marp_file_name())) {
        if bundled.exists() {
            ensure_executable(&bundled);
            return Some(bundled);
        }
    }

    search_path(marp_file_name()).or_else(|| if cfg!(windows) { search_path("marp.cmd") } else { None })
}

/// Find Chrome or Edge: `$CHROME_PATH`, then standard install locations.
pub fn find_browser_path() -> Option<PathBuf> {
    if let Some(p) = std::env::var_os(BROWSER_ENV).map(PathBuf::from) {
        if p.exists() {
            return Some(p);
        }
    }
    browser_candidates().into_iter().find(|p| p.exists())
}

fn browser_candidates() -> Vec<PathBuf> {
    if cfg!(windows) {
        let roots = ["ProgramFiles", "ProgramFiles(x86)", "LocalAppData"];
        let mut out = Vec::new();
        for root in roots {
            if let Some(dir) = std::env::var_os(root).map(PathBuf::from) {
                out.push(dir.join(r"Google\Chrome\Application\chrome.exe"));
                if root != "LocalAppData" {
                    out.push(dir.join(r"Microsoft\Edge\Application\msedge.exe"));
                }
            }
        }
        out
    } else if cfg!(target_os = "macos") {
        vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge"),
        ]
    } else {
        [
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/microsoft-edge-stable",
            "/usr/bin/microsoft-edge",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ]
        .into_iter()
        .map(PathBuf::from)
        .collect()
    }
}

fn search_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[cfg(unix)]
fn ensure_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        let mut perms = meta.permissions();
        if perms.mode() & 0o111 == 0 {
            perms.set_mode(perms.mode() | 0o755);
            if let Err(e) = std::fs::set_permissions(path, perms) {
                debug!("Could not mark {} executable: {}", path.display(), e);
            }
        }
    }
}

#[cfg(not(unix))]
fn ensure_executable(_path: &Path) {}

/// Variables the renderer needs on top of the inherited environment.
///
/// Marp reads the browser from `CHROME_PATH`. On Unix the Node runtime behind
/// a globally installed `marp` often lives in `/usr/local/bin` or
/// `/opt/homebrew/bin`, which GUI-launched processes do not have on `PATH`.
fn renderer_env(browser: &Path) -> Vec<(String, OsString)> {
    let mut env = vec![(BROWSER_ENV.to_string(), browser.as_os_str().to_owned())];
    if !cfg!(windows) {
        let mut path = OsString::from("/usr/local/bin:/opt/homebrew/bin:");
        path.push(std::env::var_os("PATH").unwrap_or_default());
        env.push(("PATH".to_string(), path));
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_missing_marp_is_unavailable() {
        let config = ConversionConfig::builder()
            .marp_path("/no/such/marp")
            .browser_path("/no/such/chrome")
            .build()
            .unwrap();
        let err = Renderer::discover(&config).unwrap_err();
        assert!(
            matches!(err, AutosplitError::RendererUnavailable { ref what, .. } if what == "Marp CLI"),
            "got: {err:?}"
        );
    }

    #[test]
    fn test_explicit_paths_are_used() {
        let dir = tempfile::tempdir().unwrap();
        let marp = dir.path().join("marp");
        let chrome = dir.path().join("chrome");
        std::fs::write(&marp, "").unwrap();
        std::fs::write(&chrome, "").unwrap();

        let config = ConversionConfig::builder()
            .marp_path(&marp)
            .browser_path(&chrome)
            .theme_set(dir.path())
            .renderer_timeout_secs(7)
            .build()
            .unwrap();
        let r = Renderer::discover(&config).unwrap();
        assert_eq!(r.marp, marp);
        assert_eq!(r.browser, chrome);
        assert_eq!(r.theme_set.as_deref(), Some(dir.path()));
        assert_eq!(r.timeout, Duration::from_secs(7));
        assert!(r
            .env
            .iter()
            .any(|(k, v)| k == BROWSER_ENV && v == chrome.as_os_str()));
    }

    #[cfg(unix)]
    #[test]
    fn test_unix_path_is_extended() {
        let env = renderer_env(Path::new("/usr/bin/chrome"));
        let (_, path) = env.iter().find(|(k, _)| k == "PATH").unwrap();
        assert!(path
            .to_string_lossy()
            .starts_with("/usr/local/bin:/opt/homebrew/bin:"));
    }

    #[test]
    fn test_platform_dir_is_known() {
        assert!(["windows", "macos", "linux"].contains(&platform_dir()));
    }
}
