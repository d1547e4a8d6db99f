use std::sync::Mutex;

/// Client-side navigation triggered after a successful create.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// Ignores navigation requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn navigate(&self, _route: &str) {}
}

/// Records every route it is asked to open, in order. Lets tests assert on
/// navigation without a client router.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self) -> Vec<String> {
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: &str) {
        tracing::debug!(route, "navigate");
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(route.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_navigator_keeps_order() {
        let nav = RecordingNavigator::new();
        nav.navigate("/accommodations/srv-1");
        nav.navigate("/accommodations/srv-2");
        assert_eq!(
            nav.routes(),
            vec!["/accommodations/srv-1", "/accommodations/srv-2"]
        );
    }
}
