//! Shared keymap
//!
//! The keymap is compiled once when the seat is created and written into an
//! anonymous, sealed memory file. Every keyboard bound later receives the same
//! descriptor and size; clients map it read-only.

use crate::config::KeyboardConfig;
use crate::error::KeymapError;
use crate::input::ModifierFlags;
use log::{debug, info};
use std::ffi::CString;
use std::fs::File;
use std::io::Write;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

/// Modifier bit positions inside the keymap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModifierIndices {
    pub shift: u32,
    pub caps: u32,
    pub ctrl: u32,
    pub alt: u32,
    pub mod2: u32,
    pub mod3: u32,
    pub logo: u32,
    pub mod5: u32,
}

impl Default for ModifierIndices {
    /// Positions of the eight real modifiers in every xkb keymap
    fn default() -> Self {
        Self {
            shift: 0,
            caps: 1,
            ctrl: 2,
            alt: 3,
            mod2: 4,
            mod3: 5,
            logo: 6,
            mod5: 7,
        }
    }
}

/// Serialized modifier state as sent in `wl_keyboard.modifiers`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierState {
    pub depressed: u32,
    pub latched: u32,
    pub locked: u32,
    pub group: u32,
}

impl ModifierIndices {
    /// Maps toolkit flags onto keymap modifier masks. Caps lock is the only
    /// locked modifier the toolkit reports; everything else is depressed.
    pub fn state_for(&self, flags: ModifierFlags) -> ModifierState {
        let depressed_map = [
            (ModifierFlags::SHIFT, self.shift),
            (ModifierFlags::CONTROL, self.ctrl),
            (ModifierFlags::MOD1, self.alt),
            (ModifierFlags::MOD2, self.mod2),
            (ModifierFlags::MOD3, self.mod3),
            (ModifierFlags::MOD4, self.logo),
            (ModifierFlags::MOD5, self.mod5),
        ];

        let mut state = ModifierState::default();
        for (flag, index) in depressed_map {
            if flags.contains(flag) && index < 32 {
                state.depressed |= 1 << index;
            }
        }
        if flags.contains(ModifierFlags::LOCK) && self.caps < 32 {
            state.locked |= 1 << self.caps;
        }
        state
    }
}

/// A compiled keymap shared through a memory file
#[derive(Debug)]
pub struct Keymap {
    fd: OwnedFd,
    size: u32,
    mods: ModifierIndices,
}

impl Keymap {
    /// Builds the keymap described by the keyboard configuration.
    ///
    /// A configured `keymap_file` is used verbatim; otherwise the RMLVO names
    /// are compiled with xkbcommon.
    pub fn from_config(config: &KeyboardConfig) -> Result<Self, KeymapError> {
        if let Some(path) = &config.keymap_file {
            let text = std::fs::read_to_string(path)?;
            info!("⌨️ Loaded keymap from {}", path.display());
            return Self::from_string(&text);
        }
        Self::compile(config)
    }

    #[cfg(feature = "xkb")]
    pub fn compile(config: &KeyboardConfig) -> Result<Self, KeymapError> {
        use xkbcommon::xkb;

        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let options = (!config.options.is_empty()).then(|| config.options.clone());
        let keymap = xkb::Keymap::new_from_names(
            &context,
            &config.rules,
            &config.model,
            &config.layout,
            &config.variant,
            options,
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        )
        .ok_or_else(|| KeymapError::Compile {
            layout: config.layout.clone(),
        })?;

        let mods = ModifierIndices {
            shift: keymap.mod_get_index("Shift"),
            caps: keymap.mod_get_index("Lock"),
            ctrl: keymap.mod_get_index("Control"),
            alt: keymap.mod_get_index("Mod1"),
            mod2: keymap.mod_get_index("Mod2"),
            mod3: keymap.mod_get_index("Mod3"),
            logo: keymap.mod_get_index("Mod4"),
            mod5: keymap.mod_get_index("Mod5"),
        };
        let text = keymap.get_as_string(xkb::KEYMAP_FORMAT_TEXT_V1);
        info!(
            "⌨️ Compiled keymap (rules={}, model={}, layout={}, variant={})",
            config.rules, config.model, config.layout, config.variant
        );
        Self::with_indices(&text, mods)
    }

    #[cfg(not(feature = "xkb"))]
    pub fn compile(_config: &KeyboardConfig) -> Result<Self, KeymapError> {
        Err(KeymapError::Unsupported)
    }

    /// Shares already compiled keymap text, assuming the standard modifier layout
    pub fn from_string(text: &str) -> Result<Self, KeymapError> {
        Self::with_indices(text, ModifierIndices::default())
    }

    pub fn with_indices(text: &str, mods: ModifierIndices) -> Result<Self, KeymapError> {
        if text.trim().is_empty() {
            return Err(KeymapError::Empty);
        }
        let (fd, size) = share_text(text)?;
        debug!("keymap shared as fd {} ({} bytes)", fd.as_raw_fd(), size);
        Ok(Self { fd, size, mods })
    }

    pub fn fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Size in bytes including the trailing NUL
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn modifier_indices(&self) -> &ModifierIndices {
        &self.mods
    }
}

/// Writes NUL-terminated `text` into a sealed memfd
fn share_text(text: &str) -> std::io::Result<(OwnedFd, u32)> {
    let name = CString::new("tessera-keymap")
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let raw = unsafe {
        libc::memfd_create(
            name.as_ptr(),
            libc::MFD_CLOEXEC | libc::MFD_ALLOW_SEALING,
        )
    };
    if raw < 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: memfd_create returned a fresh descriptor we now own
    let mut file = unsafe { File::from_raw_fd(raw) };
    file.write_all(text.as_bytes())?;
    file.write_all(&[0])?;

    let seals = libc::F_SEAL_SHRINK | libc::F_SEAL_GROW | libc::F_SEAL_WRITE | libc::F_SEAL_SEAL;
    if unsafe { libc::fcntl(file.as_raw_fd(), libc::F_ADD_SEALS, seals) } < 0 {
        return Err(std::io::Error::last_os_error());
    }

    let size = u32::try_from(text.len() + 1)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok((file.into(), size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use memmap2::Mmap;

    #[test]
    fn test_keymap_blob_is_nul_terminated_copy() {
        let text = "xkb_keymap { };";
        let keymap = Keymap::from_string(text).unwrap();
        assert_eq!(keymap.size() as usize, text.len() + 1);

        let file = File::from(keymap.fd().try_clone_to_owned().unwrap());
        let map = unsafe { Mmap::map(&file) }.unwrap();
        assert_eq!(&map[..text.len()], text.as_bytes());
        assert_eq!(map[text.len()], 0);
    }

    #[test]
    fn test_sealed_keymap_rejects_writes() {
        let keymap = Keymap::from_string("xkb_keymap { };").unwrap();
        let mut file = File::from(keymap.fd().try_clone_to_owned().unwrap());
        assert!(file.write_all(b"x").is_err());
    }

    #[test]
    fn test_empty_keymap_text_is_rejected() {
        assert!(matches!(Keymap::from_string("  \n"), Err(KeymapError::Empty)));
    }

    #[test]
    fn test_modifier_state_from_flags() {
        let mods = ModifierIndices::default();
        let state = mods.state_for(ModifierFlags::SHIFT | ModifierFlags::CONTROL | ModifierFlags::LOCK);
        assert_eq!(state.depressed, 0b101);
        assert_eq!(state.locked, 0b10);
        assert_eq!(state.latched, 0);

        let state = mods.state_for(ModifierFlags::SUPER | ModifierFlags::ALT);
        assert_eq!(state.depressed, (1 << 6) | (1 << 3));
        assert_eq!(mods.state_for(ModifierFlags::empty()), ModifierState::default());
    }

    #[test]
    fn test_keymap_file_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keymap.xkb");
        std::fs::write(&path, "xkb_keymap { xkb_keycodes { }; };").unwrap();

        let config = KeyboardConfig {
            keymap_file: Some(path),
            ..KeyboardConfig::default()
        };
        let keymap = Keymap::from_config(&config).unwrap();
        assert!(keymap.size() > 1);
    }
}
