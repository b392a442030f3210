use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::ptr::NonNull;

use tracing::{debug, info};

use crate::error::{Result, ShmError};

/// A mapped POSIX shared-memory object.
///
/// The handle returned by [`SharedRegion::create`] is the *owner*: dropping it
/// unmaps the memory and unlinks the name. Handles returned by
/// [`SharedRegion::attach`] are read-only and only unmap on drop, so a reader
/// never removes the region out from under its producer.
///
/// There is no synchronization of any kind. A reader that races a writer may
/// observe a mix of old and new bytes.
pub struct SharedRegion {
    ptr: NonNull<u8>,
    len: usize,
    name: String,
    writable: bool,
    created_identity: Option<(u64, u64)>,
    /// Whether the name should be unlinked on drop (owner only).
    unlink_on_drop: bool,
}

// SAFETY: the mapping is process-wide; the pointer is not tied to the thread
// that created it and all access goes through `&self`/`&mut self` methods.
unsafe impl Send for SharedRegion {}

impl SharedRegion {
    /// Default permission mode for created regions.
    pub const DEFAULT_REGION_MODE: u32 = 0o600;
    /// Maximum object name length, including the leading slash.
    #[cfg(target_os = "macos")]
    const MAX_NAME_LEN: usize = 31;
    #[cfg(not(target_os = "macos"))]
    const MAX_NAME_LEN: usize = 255;

    /// Create a region of exactly `capacity` bytes and become its owner.
    ///
    /// A stale region left behind under the same name (for example by a
    /// producer that was killed) is unlinked first.
    pub fn create(name: &str, capacity: usize) -> Result<Self> {
        Self::create_with_mode(name, capacity, Self::DEFAULT_REGION_MODE)
    }

    /// Create a region with an explicit permission mode.
    pub fn create_with_mode(name: &str, capacity: usize, mode: u32) -> Result<Self> {
        let name = normalize_name(name)?;
        if capacity == 0 || libc::off_t::try_from(capacity).is_err() {
            return Err(ShmError::InvalidCapacity { capacity });
        }
        let cname = c_name(&name)?;

        if shm_unlink(&cname).is_ok() {
            debug!(%name, "removed stale region");
        }

        let fd = shm_open(&cname, libc::O_CREAT | libc::O_EXCL | libc::O_RDWR, mode).map_err(
            |source| ShmError::Create {
                name: name.clone(),
                source,
            },
        )?;

        let setup = || -> io::Result<((u64, u64), NonNull<u8>)> {
            // SAFETY: `fd` is an open descriptor owned by this function and the
            // length was checked to fit in `off_t` above.
            let rc = unsafe { libc::ftruncate(fd.as_raw_fd(), capacity as libc::off_t) };
            if rc != 0 {
                return Err(io::Error::last_os_error());
            }
            let (identity, _) = fstat(&fd)?;
            let ptr = map(&fd, capacity, libc::PROT_READ | libc::PROT_WRITE)?;
            Ok((identity, ptr))
        };

        let (identity, ptr) = match setup() {
            Ok(parts) => parts,
            Err(source) => {
                let _ = shm_unlink(&cname);
                return Err(ShmError::Create { name, source });
            }
        };

        info!(%name, capacity, "created shared memory region");

        Ok(Self {
            ptr,
            len: capacity,
            name,
            writable: true,
            created_identity: Some(identity),
            unlink_on_drop: true,
        })
    }

    /// Attach read-only to a region created by another process.
    ///
    /// Returns [`ShmError::NotFound`] when no region with this name exists.
    pub fn attach(name: &str) -> Result<Self> {
        let name = normalize_name(name)?;
        let cname = c_name(&name)?;

        let fd = shm_open(&cname, libc::O_RDONLY, 0).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ShmError::NotFound { name: name.clone() }
            } else {
                ShmError::Attach {
                    name: name.clone(),
                    source,
                }
            }
        })?;

        let attach_err = |source| ShmError::Attach {
            name: name.clone(),
            source,
        };

        let (_, size) = fstat(&fd).map_err(attach_err)?;
        if size == 0 {
            // The owner has created the name but not sized it yet.
            return Err(attach_err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "region has not been sized yet",
            )));
        }
        let ptr = map(&fd, size, libc::PROT_READ).map_err(attach_err)?;

        debug!(%name, capacity = size, "attached shared memory region");

        Ok(Self {
            ptr,
            len: size,
            name,
            writable: false,
            created_identity: None,
            unlink_on_drop: false,
        })
    }

    /// Check whether a region with this name currently exists.
    pub fn exists(name: &str) -> Result<bool> {
        let name = normalize_name(name)?;
        let cname = c_name(&name)?;
        match shm_open(&cname, libc::O_RDONLY, 0) {
            Ok(_fd) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(ShmError::Attach { name, source }),
        }
    }

    /// Copy `buf.len()` bytes starting at `offset` out of the region.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.check_bounds(offset, buf.len())?;
        // SAFETY: the range was bounds-checked against the live mapping, and
        // `buf` is a separate Rust allocation so the ranges cannot overlap.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.ptr.as_ptr().add(offset),
                buf.as_mut_ptr(),
                buf.len(),
            );
        }
        Ok(())
    }

    /// Copy `data` into the region starting at `offset`.
    pub fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(ShmError::ReadOnly {
                name: self.name.clone(),
            });
        }
        self.check_bounds(offset, data.len())?;
        // SAFETY: the range was bounds-checked against a writable mapping, and
        // `data` is a separate Rust allocation so the ranges cannot overlap.
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.ptr.as_ptr().add(offset),
                data.len(),
            );
        }
        Ok(())
    }

    /// The normalized object name (always starts with `/`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mapped size in bytes.
    pub fn capacity(&self) -> usize {
        self.len
    }

    /// Whether this handle created the region and will unlink it on drop.
    pub fn is_owner(&self) -> bool {
        self.unlink_on_drop
    }

    fn check_bounds(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(ShmError::OutOfBounds {
                offset,
                len,
                capacity: self.len,
            }),
        }
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`len` describe a mapping created by a successful mmap
        // call, and it is unmapped exactly once, here.
        let rc = unsafe { libc::munmap(self.ptr.as_ptr().cast::<libc::c_void>(), self.len) };
        if rc != 0 {
            debug!(
                name = %self.name,
                error = %io::Error::last_os_error(),
                "munmap failed"
            );
        }

        if !self.unlink_on_drop {
            return;
        }
        let Some(expected) = self.created_identity else {
            return;
        };
        let Ok(cname) = c_name(&self.name) else {
            return;
        };
        match current_identity(&cname) {
            Some(identity) if identity == expected => {
                debug!(name = %self.name, "unlinking shared memory region");
                let _ = shm_unlink(&cname);
            }
            Some(_) => {
                debug!(
                    name = %self.name,
                    "region identity changed; skipping unlink"
                );
            }
            None => {
                debug!(name = %self.name, "region already unlinked");
            }
        }
    }
}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("name", &self.name)
            .field("capacity", &self.len)
            .field("owner", &self.unlink_on_drop)
            .finish()
    }
}

/// Normalize a region name to the portable `/name` form.
///
/// Accepts names with or without the leading slash. Rejects empty names,
/// names with interior slashes, and names over the platform limit.
pub fn normalize_name(name: &str) -> Result<String> {
    let invalid = |reason| ShmError::InvalidName {
        name: name.to_string(),
        reason,
    };

    let bare = name.strip_prefix('/').unwrap_or(name);
    if bare.is_empty() {
        return Err(invalid("name is empty"));
    }
    if bare.contains('/') {
        return Err(invalid("name must not contain '/' after the leading slash"));
    }
    if bare.contains('\0') {
        return Err(invalid("name must not contain NUL"));
    }
    if bare.len() + 1 > SharedRegion::MAX_NAME_LEN {
        return Err(invalid("name is too long for this platform"));
    }
    Ok(format!("/{bare}"))
}

fn c_name(name: &str) -> Result<CString> {
    CString::new(name).map_err(|_| ShmError::InvalidName {
        name: name.to_string(),
        reason: "name must not contain NUL",
    })
}

fn shm_open(name: &CString, flags: libc::c_int, mode: u32) -> io::Result<OwnedFd> {
    // SAFETY: `name` is a valid NUL-terminated string for the duration of the call.
    #[cfg(target_os = "macos")]
    let fd = unsafe { libc::shm_open(name.as_ptr(), flags, mode as libc::c_uint) };
    // SAFETY: as above.
    #[cfg(not(target_os = "macos"))]
    let fd = unsafe { libc::shm_open(name.as_ptr(), flags, mode as libc::mode_t) };

    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `fd` was just returned by shm_open and is owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn shm_unlink(name: &CString) -> io::Result<()> {
    // SAFETY: `name` is a valid NUL-terminated string for the duration of the call.
    let rc = unsafe { libc::shm_unlink(name.as_ptr()) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Returns `((dev, ino), size)` for an open descriptor.
fn fstat(fd: &OwnedFd) -> io::Result<((u64, u64), usize)> {
    let mut stat = std::mem::MaybeUninit::<libc::stat>::uninit();
    // SAFETY: `stat` is a writable buffer of the right size and `fd` is open.
    let rc = unsafe { libc::fstat(fd.as_raw_fd(), stat.as_mut_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: fstat returned success, so the buffer is initialized.
    let stat = unsafe { stat.assume_init() };
    let size = usize::try_from(stat.st_size)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "negative region size"))?;
    Ok(((stat.st_dev as u64, stat.st_ino as u64), size))
}

fn map(fd: &OwnedFd, len: usize, prot: libc::c_int) -> io::Result<NonNull<u8>> {
    // SAFETY: requesting a fresh shared mapping of an open descriptor; the
    // kernel validates `len` against the object and reports failure via MAP_FAILED.
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            prot,
            libc::MAP_SHARED,
            fd.as_raw_fd(),
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    NonNull::new(ptr.cast::<u8>())
        .ok_or_else(|| io::Error::other("mmap returned null"))
}

fn current_identity(name: &CString) -> Option<(u64, u64)> {
    let fd = shm_open(name, libc::O_RDONLY, 0).ok()?;
    fstat(&fd).ok().map(|(identity, _)| identity)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    static NEXT: AtomicU32 = AtomicU32::new(0);

    // macOS caps names at 31 bytes, so keep these short.
    fn unique_name(tag: &str) -> String {
        format!(
            "/dl-{tag}-{}-{}",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn test_create_write_attach_read() {
        let name = unique_name("rw");
        let mut owner = SharedRegion::create(&name, 4096).unwrap();
        assert!(owner.is_owner());
        owner.write_at(100, b"hello").unwrap();

        let reader = SharedRegion::attach(&name).unwrap();
        assert!(!reader.is_owner());
        assert!(reader.capacity() >= 4096);

        let mut buf = [0u8; 5];
        reader.read_at(100, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_attach_missing_is_not_found() {
        let name = unique_name("miss");
        let result = SharedRegion::attach(&name);
        assert!(matches!(result, Err(ShmError::NotFound { .. })));
    }

    #[test]
    fn test_owner_drop_unlinks() {
        let name = unique_name("drop");
        let owner = SharedRegion::create(&name, 64).unwrap();
        assert!(SharedRegion::exists(&name).unwrap());

        drop(owner);
        assert!(
            !SharedRegion::exists(&name).unwrap(),
            "region should be unlinked when the owner drops"
        );
    }

    #[test]
    fn test_reader_drop_keeps_region() {
        let name = unique_name("keep");
        let _owner = SharedRegion::create(&name, 64).unwrap();
        let reader = SharedRegion::attach(&name).unwrap();

        drop(reader);
        assert!(SharedRegion::exists(&name).unwrap());
    }

    #[test]
    fn test_reader_survives_unlink() {
        let name = unique_name("unl");
        let mut owner = SharedRegion::create(&name, 64).unwrap();
        owner.write_at(0, &[7, 8, 9]).unwrap();
        let reader = SharedRegion::attach(&name).unwrap();

        drop(owner);
        assert!(!SharedRegion::exists(&name).unwrap());

        let mut buf = [0u8; 3];
        reader.read_at(0, &mut buf).unwrap();
        assert_eq!(buf, [7, 8, 9]);
    }

    #[test]
    fn test_attached_handle_is_read_only() {
        let name = unique_name("ro");
        let _owner = SharedRegion::create(&name, 64).unwrap();
        let mut reader = SharedRegion::attach(&name).unwrap();

        let result = reader.write_at(0, b"x");
        assert!(matches!(result, Err(ShmError::ReadOnly { .. })));
    }

    #[test]
    fn test_out_of_bounds_access() {
        let name = unique_name("oob");
        let mut owner = SharedRegion::create(&name, 16).unwrap();

        let result = owner.write_at(10, &[0u8; 8]);
        assert!(matches!(result, Err(ShmError::OutOfBounds { .. })));

        let mut buf = [0u8; 4];
        let result = owner.read_at(usize::MAX, &mut buf);
        assert!(matches!(result, Err(ShmError::OutOfBounds { .. })));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let name = unique_name("zero");
        let result = SharedRegion::create(&name, 0);
        assert!(matches!(result, Err(ShmError::InvalidCapacity { .. })));
    }

    #[test]
    fn test_create_replaces_stale_region() {
        let name = unique_name("stale");
        let first = SharedRegion::create(&name, 64).unwrap();
        let mut second = SharedRegion::create(&name, 64).unwrap();
        second.write_at(0, b"new").unwrap();

        drop(first);
        assert!(
            SharedRegion::exists(&name).unwrap(),
            "drop must not unlink a region it no longer owns"
        );

        let reader = SharedRegion::attach(&name).unwrap();
        let mut buf = [0u8; 3];
        reader.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"new");
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("frames").unwrap(), "/frames");
        assert_eq!(normalize_name("/frames").unwrap(), "/frames");
        assert!(normalize_name("").is_err());
        assert!(normalize_name("/").is_err());
        assert!(normalize_name("/a/b").is_err());
        assert!(matches!(
            normalize_name(&"x".repeat(300)),
            Err(ShmError::InvalidName { .. })
        ));
    }
}
