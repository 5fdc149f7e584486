//! Concurrent-open intent rules for opens that share one store.

use hdfcore_io::AccessFlags;

use crate::error::{Category, Error, Result};

/// The four valid combinations of read-write, SWMR-write and SWMR-read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Write,
    SwmrWrite,
    SwmrRead,
    Read,
}

impl Mode {
    pub fn of(flags: AccessFlags) -> Result<Mode> {
        let rw = flags.is_writable();
        let sw = flags.contains(AccessFlags::SWMR_WRITE);
        let sr = flags.contains(AccessFlags::SWMR_READ);
        match (rw, sw, sr) {
            (true, false, false) => Ok(Mode::Write),
            (true, true, false) => Ok(Mode::SwmrWrite),
            (false, false, true) => Ok(Mode::SwmrRead),
            (false, false, false) => Ok(Mode::Read),
            _ => Err(Error::args(
                Category::File,
                format!("invalid combination of access flags {flags:?}"),
            )),
        }
    }

    /// Whether a new open in mode `self` may join a store held in `holder`.
    pub fn may_join(self, holder: Mode) -> bool {
        use Mode::*;
        match self {
            Write => matches!(holder, Write | SwmrWrite),
            SwmrWrite => holder == SwmrWrite,
            SwmrRead => matches!(holder, Write | SwmrWrite | SwmrRead),
            Read => true,
        }
    }
}

/// Check a second open of an already open store.
pub(crate) fn check_join(new: AccessFlags, held: AccessFlags) -> Result<()> {
    if new.contains(AccessFlags::TRUNC) {
        return Err(Error::conflict(
            Category::File,
            "unable to truncate a file which is already open",
        ));
    }
    if new.contains(AccessFlags::EXCL) {
        return Err(Error::new(
            Category::File,
            crate::error::ErrorKind::AlreadyExists,
            "file exists",
        ));
    }
    let (mode, holder) = (Mode::of(new)?, Mode::of(held)?);
    if !mode.may_join(holder) {
        return Err(Error::conflict(
            Category::File,
            format!("file already open as {holder:?}; cannot open as {mode:?}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const W: AccessFlags = AccessFlags::RDWR;

    fn sw() -> AccessFlags {
        AccessFlags::RDWR | AccessFlags::SWMR_WRITE
    }

    fn sr() -> AccessFlags {
        AccessFlags::SWMR_READ
    }

    #[test]
    fn invalid_combinations() {
        assert!(Mode::of(AccessFlags::SWMR_WRITE).is_err());
        assert!(Mode::of(sw() | AccessFlags::SWMR_READ).is_err());
        assert!(Mode::of(W | AccessFlags::SWMR_READ).is_err());
    }

    #[test]
    fn matrix() {
        let r = AccessFlags::RDONLY;
        let ok = |new, held| check_join(new, held).is_ok();
        assert!(ok(W, W));
        assert!(ok(W, sw()));
        assert!(!ok(W, sr()));
        assert!(!ok(W, r));
        assert!(!ok(sw(), W));
        assert!(ok(sw(), sw()));
        assert!(ok(sr(), W));
        assert!(!ok(sr(), r));
        assert!(ok(r, r));
        assert!(ok(r, sr()));
    }

    #[test]
    fn truncate_and_exclusive_refused() {
        let e = check_join(W | AccessFlags::TRUNC, W).unwrap_err();
        assert_eq!(e.kind, ErrorKind::Conflict);
        let e = check_join(W | AccessFlags::EXCL, W).unwrap_err();
        assert_eq!(e.kind, ErrorKind::AlreadyExists);
    }
}
