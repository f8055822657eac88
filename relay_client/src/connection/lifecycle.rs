/// Application lifecycle state as reported by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Foreground,
    Background,
}

/// Callback invoked when the background execution grant runs out.
pub type ExpirationHandler = Box<dyn FnOnce() + Send + 'static>;

/// Host-platform hook for requesting background execution time.
pub trait BackgroundTaskRegistrar: Send + Sync + 'static {
    /// Requests a background execution grant. `on_expiration` must be invoked
    /// when the grant expires.
    fn register(&self, name: &str, on_expiration: ExpirationHandler);

    /// Releases the current grant, if any.
    fn invalidate(&self);
}

/// Registrar for platforms without background execution limits. The grant
/// never expires.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBackgroundTaskRegistrar;

impl BackgroundTaskRegistrar for NoopBackgroundTaskRegistrar {
    fn register(&self, _name: &str, _on_expiration: ExpirationHandler) {}

    fn invalidate(&self) {}
}
