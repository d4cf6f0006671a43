use std::convert::Infallible;

use log::info;

use crate::{feeds::FeedLabel, panel::Button};

/// Where logical UI state goes to be drawn. Compositing itself is the
/// implementor's business.
pub trait Display {
    type Error: std::error::Error + Send + Sync + 'static;

    /// `level` is already clamped to `[0, 1]`.
    fn set_backlight(&mut self, level: f32) -> Result<(), Self::Error>;

    fn show_buttons(&mut self, buttons: &[Button]) -> Result<(), Self::Error>;

    fn show_feed(&mut self, label: &FeedLabel) -> Result<(), Self::Error>;
}

/// Headless display that reports every change through the log.
#[derive(Debug, Default)]
pub struct LogDisplay {
    pub renders: u64,
}

impl Display for LogDisplay {
    type Error = Infallible;

    fn set_backlight(&mut self, level: f32) -> Result<(), Infallible> {
        info!("backlight set to {:.0}%", level * 100.0);
        Ok(())
    }

    fn show_buttons(&mut self, buttons: &[Button]) -> Result<(), Infallible> {
        self.renders = self.renders.saturating_add(1);
        for button in buttons {
            info!(
                "[{}] {} {} {}x{}@({},{}){}",
                button.id,
                button.label,
                button.style.as_str(),
                button.bounds.width,
                button.bounds.height,
                button.bounds.x,
                button.bounds.y,
                if button.selected { " *" } else { "" }
            );
        }
        Ok(())
    }

    fn show_feed(&mut self, label: &FeedLabel) -> Result<(), Infallible> {
        info!(
            "label {}: {}",
            label.topic,
            label.text.as_deref().unwrap_or("--")
        );
        Ok(())
    }
}
