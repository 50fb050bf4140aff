/// Conditional-compilation guard tied to a feature macro.
///
/// The guard-open line doubles as the sentinel: its presence anywhere in a
/// file's live content is the sole signal that the file was already patched.
/// Backup files are never consulted for this decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardSpec {
    macro_name: String,
}

impl GuardSpec {
    pub fn new(macro_name: impl Into<String>) -> Self {
        Self {
            macro_name: macro_name.into(),
        }
    }

    /// The default guard for SD-card exclusion builds.
    pub fn no_sd_card() -> Self {
        Self::new("NO_SD_CARD")
    }

    pub fn macro_name(&self) -> &str {
        &self.macro_name
    }

    /// Guard-open directive, e.g. `#ifndef NO_SD_CARD`.
    pub fn open_line(&self) -> String {
        format!("#ifndef {}", self.macro_name)
    }

    /// Guard-close directive, e.g. `#endif // NO_SD_CARD`.
    pub fn close_line(&self) -> String {
        format!("#endif // {}", self.macro_name)
    }

    /// The sentinel token checked for idempotency. Identical to the
    /// guard-open line.
    pub fn sentinel(&self) -> String {
        self.open_line()
    }

    /// Whether `content` has already been transformed by this guard.
    pub fn is_patched(&self, content: &str) -> bool {
        content.contains(&self.open_line())
    }
}

impl Default for GuardSpec {
    fn default() -> Self {
        Self::no_sd_card()
    }
}
