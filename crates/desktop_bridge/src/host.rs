use std::path::PathBuf;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::info;

use crate::Result;

/// Native capabilities the desktop shell lends to the renderer.
pub trait ShellHost: Send + Sync {
    /// `None` when the user cancels the picker.
    fn pick_folder(&self, suggested: Option<PathBuf>) -> Result<Option<PathBuf>>;
    fn minimize(&self) -> Result<()>;
    fn is_maximized(&self) -> Result<bool>;
    fn maximize(&self) -> Result<()>;
    fn unmaximize(&self) -> Result<()>;
    fn close(&self) -> Result<()>;
    fn restart(&self) -> Result<()>;
    fn navigate(&self, path: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellExit {
    Close,
    Restart,
}

#[derive(Debug, Default, Clone)]
pub struct WindowState {
    pub minimized: bool,
    pub maximized: bool,
    pub location: Option<String>,
}

/// Host used when the renderer talks to us over HTTP instead of a native
/// window. Window operations only track state; close and restart are
/// published on a watch channel so the process owner can act on them.
pub struct HeadlessHost {
    window: Mutex<WindowState>,
    exit_tx: watch::Sender<Option<ShellExit>>,
}

impl HeadlessHost {
    pub fn new() -> (Self, watch::Receiver<Option<ShellExit>>) {
        let (exit_tx, exit_rx) = watch::channel(None);
        (
            Self {
                window: Mutex::new(WindowState::default()),
                exit_tx,
            },
            exit_rx,
        )
    }

    pub fn window_state(&self) -> WindowState {
        self.window.lock().clone()
    }

    fn request_exit(&self, exit: ShellExit) {
        info!(?exit, "shell exit requested");
        self.exit_tx.send_replace(Some(exit));
    }
}

impl ShellHost for HeadlessHost {
    fn pick_folder(&self, suggested: Option<PathBuf>) -> Result<Option<PathBuf>> {
        Ok(suggested)
    }

    fn minimize(&self) -> Result<()> {
        self.window.lock().minimized = true;
        Ok(())
    }

    fn is_maximized(&self) -> Result<bool> {
        Ok(self.window.lock().maximized)
    }

    fn maximize(&self) -> Result<()> {
        let mut window = self.window.lock();
        window.maximized = true;
        window.minimized = false;
        Ok(())
    }

    fn unmaximize(&self) -> Result<()> {
        self.window.lock().maximized = false;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.request_exit(ShellExit::Close);
        Ok(())
    }

    fn restart(&self) -> Result<()> {
        self.request_exit(ShellExit::Restart);
        Ok(())
    }

    fn navigate(&self, path: &str) -> Result<()> {
        info!(%path, "navigating renderer");
        self.window.lock().location = Some(path.to_string());
        Ok(())
    }
}
