// SPDX-License-Identifier: (MIT OR Apache-2.0)

use std::thread;

/// Spawn settings for a `CancellableThread` or the thread behind a `Task`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadConfig {
    pub name: Option<String>,
    pub stack_size: Option<usize>,
}

impl ThreadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    pub(crate) fn builder(&self) -> thread::Builder {
        let mut builder = thread::Builder::new();
        if let Some(name) = &self.name {
            builder = builder.name(name.clone());
        }
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_empty() {
        let cfg = ThreadConfig::default();
        assert_eq!(cfg.name, None);
        assert_eq!(cfg.stack_size, None);
    }

    #[test]
    fn builder_applies_name() {
        let cfg = ThreadConfig::new().name("audio-mixer").stack_size(256 * 1024);
        let name = cfg
            .builder()
            .spawn(|| thread::current().name().map(str::to_string))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(name.as_deref(), Some("audio-mixer"));
    }
}
