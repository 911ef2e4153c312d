/// Packed per-node configuration flags.
///
/// `ACTIVE` is set whenever any configuration is recorded, so a merge
/// can tell a deliberately configured node from one still at defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ConfigFlags(u16);

impl ConfigFlags {
    pub(crate) const ACTIVE: u16 = 1 << 0;
    pub(crate) const SECURE: u16 = 1 << 1;
    pub(crate) const REDIRECT_INSECURE: u16 = 1 << 2;
    pub(crate) const TRAILING_SLASH: u16 = 1 << 3;
    pub(crate) const STRICT_ON_TRAILING_SLASH: u16 = 1 << 4;
    pub(crate) const LENIENT_ON_TRAILING_SLASH: u16 = 1 << 5;
    pub(crate) const LENIENT_ON_UNCLEAN_PATH: u16 = 1 << 6;
    pub(crate) const HANDLE_PATH_AS_IS: u16 = 1 << 7;
    pub(crate) const SUBTREE_HANDLER: u16 = 1 << 8;

    pub(crate) fn set(&mut self, flags: u16) {
        self.0 |= flags | Self::ACTIVE;
    }

    pub(crate) fn has(self, flags: u16) -> bool {
        self.0 & flags == flags
    }

    pub(crate) fn has_any(self, flags: u16) -> bool {
        self.0 & flags != 0
    }

    pub(crate) fn is_active(self) -> bool {
        self.has(Self::ACTIVE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setting_any_flag_activates() {
        let mut flags = ConfigFlags::default();
        assert!(!flags.is_active());
        flags.set(ConfigFlags::SUBTREE_HANDLER);
        assert!(flags.is_active());
        assert!(flags.has(ConfigFlags::SUBTREE_HANDLER));
        assert!(!flags.has(ConfigFlags::SECURE));
    }

    #[test]
    fn test_has_any() {
        let mut flags = ConfigFlags::default();
        flags.set(ConfigFlags::LENIENT_ON_TRAILING_SLASH);
        assert!(flags.has_any(
            ConfigFlags::LENIENT_ON_TRAILING_SLASH | ConfigFlags::STRICT_ON_TRAILING_SLASH
        ));
        assert!(!flags.has(
            ConfigFlags::LENIENT_ON_TRAILING_SLASH | ConfigFlags::STRICT_ON_TRAILING_SLASH
        ));
    }
}
