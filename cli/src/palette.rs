use owo_colors::OwoColorize;
use supports_color::Stream;

/// Colors for one output stream, disabled when the stream can't show them.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Palette {
    enabled: bool,
}

impl Palette {
    pub(crate) fn stdout() -> Self {
        Self {
            enabled: supports_color::on(Stream::Stdout).is_some(),
        }
    }

    pub(crate) fn stderr() -> Self {
        Self {
            enabled: supports_color::on(Stream::Stderr).is_some(),
        }
    }

    pub(crate) fn ok(self, text: &str) -> String {
        self.paint(text, |t| t.green().to_string())
    }

    pub(crate) fn warn(self, text: &str) -> String {
        self.paint(text, |t| t.yellow().to_string())
    }

    pub(crate) fn error(self, text: &str) -> String {
        self.paint(text, |t| t.red().bold().to_string())
    }

    pub(crate) fn dim(self, text: &str) -> String {
        self.paint(text, |t| t.dimmed().to_string())
    }

    fn paint(self, text: &str, style: impl FnOnce(&str) -> String) -> String {
        if self.enabled {
            style(text)
        } else {
            text.to_string()
        }
    }
}
