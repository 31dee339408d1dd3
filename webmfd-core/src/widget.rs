//! The host-owned panel a session drives

/// A display panel whose soft-key captions a session keeps in sync
///
/// The host owns the widget; sessions only hold a `Weak` reference and
/// stop updating it once the host drops it.
pub trait PanelWidget: Send + Sync {
    /// Set the caption of soft key `slot` (0..6 left, 6..12 right, top to bottom)
    fn set_button_label(&self, slot: usize, text: &str);

    /// Surface a transport failure to the user
    fn notify_error(&self, message: &str);
}
