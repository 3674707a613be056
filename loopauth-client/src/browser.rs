//! Opening the authorization URL.

use std::io;

/// Presents the authorization URL to the user.
///
/// Implemented for closures, so tests can drive the redirect themselves.
pub trait BrowserLauncher: Send + Sync {
    /// Open `url`. A failure is reported but does not abort the login.
    fn open(&self, url: &str) -> io::Result<()>;
}

impl<F> BrowserLauncher for F
where
    F: Fn(&str) -> io::Result<()> + Send + Sync,
{
    fn open(&self, url: &str) -> io::Result<()> {
        self(url)
    }
}

/// The platform's default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> io::Result<()> {
        open::that(url)
    }
}

/// Opens nothing; the user copies the logged URL by hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBrowser;

impl BrowserLauncher for NoBrowser {
    fn open(&self, _url: &str) -> io::Result<()> {
        Ok(())
    }
}
