//! Thin RAII wrappers over the OS objects behind the shared channel: a POSIX
//! named semaphore and a System V shared-memory segment.
//!
//! Each wrapper releases what it acquired when dropped. The creating side
//! (`owner`) also unlinks/removes the object so a clean shutdown leaves
//! nothing behind in the system namespace.

use std::ffi::CString;

use crate::error::{Error, Result};

const PERMISSIONS: libc::c_uint = 0o666;

/// A POSIX named semaphore used as a cross-process binary lock.
#[derive(Debug)]
pub(crate) struct NamedSemaphore {
    sem: *mut libc::sem_t,
    name: CString,
    owner: bool,
}

// The handle is a process-wide kernel object; sem_wait/sem_post are
// thread-safe.
unsafe impl Send for NamedSemaphore {}

fn semaphore_name(name: &str) -> Result<CString> {
    if !name.starts_with('/') || name.len() < 2 || name[1..].contains('/') {
        return Err(Error::InvalidConfig(format!(
            "semaphore name must look like \"/name\", got {name:?}"
        )));
    }
    CString::new(name)
        .map_err(|_| Error::InvalidConfig(format!("semaphore name contains NUL: {name:?}")))
}

impl NamedSemaphore {
    /// Create a new semaphore with count 1. Fails if the name already exists.
    pub fn create_exclusive(name: &str) -> Result<Self> {
        let c_name = semaphore_name(name)?;
        let initial: libc::c_uint = 1;
        let sem = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                PERMISSIONS,
                initial,
            )
        };
        if sem == libc::SEM_FAILED {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EEXIST) {
                return Err(Error::ChannelExists {
                    resource: "semaphore",
                    name: name.to_string(),
                });
            }
            return Err(Error::Ipc {
                op: "sem_open",
                source: err,
            });
        }
        Ok(Self {
            sem,
            name: c_name,
            owner: true,
        })
    }

    /// Open a semaphore some other process created.
    pub fn open(name: &str) -> Result<Self> {
        let c_name = semaphore_name(name)?;
        let sem = unsafe { libc::sem_open(c_name.as_ptr(), 0) };
        if sem == libc::SEM_FAILED {
            return Err(Error::last_os("sem_open"));
        }
        Ok(Self {
            sem,
            name: c_name,
            owner: false,
        })
    }

    /// Block until the semaphore can be decremented. No timeout.
    pub fn wait(&self) -> Result<()> {
        loop {
            if unsafe { libc::sem_wait(self.sem) } == 0 {
                return Ok(());
            }
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::Interrupted {
                return Err(Error::Ipc {
                    op: "sem_wait",
                    source: err,
                });
            }
        }
    }

    pub fn post(&self) -> Result<()> {
        if unsafe { libc::sem_post(self.sem) } != 0 {
            return Err(Error::last_os("sem_post"));
        }
        Ok(())
    }

    /// Remove a semaphore name. `Ok(false)` if it did not exist.
    pub fn unlink(name: &str) -> Result<bool> {
        let c_name = semaphore_name(name)?;
        if unsafe { libc::sem_unlink(c_name.as_ptr()) } == 0 {
            return Ok(true);
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOENT) {
            return Ok(false);
        }
        Err(Error::Ipc {
            op: "sem_unlink",
            source: err,
        })
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        unsafe {
            if libc::sem_close(self.sem) != 0 {
                tracing::error!(
                    name = ?self.name,
                    error = %std::io::Error::last_os_error(),
                    "sem_close failed"
                );
            }
            if self.owner && libc::sem_unlink(self.name.as_ptr()) != 0 {
                tracing::error!(
                    name = ?self.name,
                    error = %std::io::Error::last_os_error(),
                    "sem_unlink failed"
                );
            }
        }
    }
}

/// An attached System V shared-memory segment.
#[derive(Debug)]
pub(crate) struct SharedSegment {
    id: libc::c_int,
    addr: *mut libc::c_void,
    len: usize,
    key: libc::key_t,
    owner: bool,
}

// Access to the mapped words is serialized by the channel semaphore.
unsafe impl Send for SharedSegment {}

fn check_key(key: libc::key_t) -> Result<()> {
    if key == libc::IPC_PRIVATE {
        return Err(Error::InvalidConfig(
            "shared memory key 0 (IPC_PRIVATE) cannot be shared by name".into(),
        ));
    }
    Ok(())
}

impl SharedSegment {
    /// Create and attach a zero-filled segment. Fails if the key is taken.
    pub fn create_exclusive(key: libc::key_t, len: usize) -> Result<Self> {
        check_key(key)?;
        let flags = libc::IPC_CREAT | libc::IPC_EXCL | PERMISSIONS as libc::c_int;
        let id = unsafe { libc::shmget(key, len, flags) };
        if id < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EEXIST) {
                return Err(Error::ChannelExists {
                    resource: "shared memory segment",
                    name: key.to_string(),
                });
            }
            return Err(Error::Ipc {
                op: "shmget",
                source: err,
            });
        }
        match Self::attach_id(id, 0) {
            Ok(addr) => Ok(Self {
                id,
                addr,
                len,
                key,
                owner: true,
            }),
            Err(e) => {
                unsafe { libc::shmctl(id, libc::IPC_RMID, std::ptr::null_mut()) };
                Err(e)
            }
        }
    }

    /// Attach an existing segment read-only, checking it holds `len` bytes.
    pub fn attach_existing(key: libc::key_t, len: usize) -> Result<Self> {
        check_key(key)?;
        let id = unsafe { libc::shmget(key, 0, 0) };
        if id < 0 {
            return Err(Error::last_os("shmget"));
        }
        let found = Self::segment_size(id)?;
        if found < len {
            return Err(Error::LayoutMismatch {
                expected: len,
                found,
            });
        }
        let addr = Self::attach_id(id, libc::SHM_RDONLY)?;
        Ok(Self {
            id,
            addr,
            len,
            key,
            owner: false,
        })
    }

    /// Mark the segment for removal. `Ok(false)` if no segment has this key.
    pub fn remove(key: libc::key_t) -> Result<bool> {
        check_key(key)?;
        let id = unsafe { libc::shmget(key, 0, 0) };
        if id < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ENOENT) {
                return Ok(false);
            }
            return Err(Error::Ipc {
                op: "shmget",
                source: err,
            });
        }
        if unsafe { libc::shmctl(id, libc::IPC_RMID, std::ptr::null_mut()) } != 0 {
            return Err(Error::last_os("shmctl(IPC_RMID)"));
        }
        Ok(true)
    }

    fn attach_id(id: libc::c_int, flags: libc::c_int) -> Result<*mut libc::c_void> {
        let addr = unsafe { libc::shmat(id, std::ptr::null(), flags) };
        if addr as isize == -1 {
            return Err(Error::last_os("shmat"));
        }
        Ok(addr)
    }

    fn segment_size(id: libc::c_int) -> Result<usize> {
        let mut stat: libc::shmid_ds = unsafe { std::mem::zeroed() };
        if unsafe { libc::shmctl(id, libc::IPC_STAT, &mut stat) } != 0 {
            return Err(Error::last_os("shmctl(IPC_STAT)"));
        }
        Ok(stat.shm_segsz as usize)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Copy `words` to the start of the segment.
    ///
    /// # Safety
    /// The caller must hold the channel semaphore, and the segment must
    /// have been created (not attached read-only) by this process.
    pub unsafe fn write_words<T: Copy>(&self, words: &[T]) {
        debug_assert!(self.owner);
        debug_assert!(std::mem::size_of_val(words) <= self.len);
        std::ptr::copy_nonoverlapping(words.as_ptr(), self.addr as *mut T, words.len());
    }

    /// Copy the start of the segment into `words`.
    ///
    /// # Safety
    /// The caller must hold the channel semaphore for a consistent snapshot.
    pub unsafe fn read_words<T: Copy>(&self, words: &mut [T]) {
        debug_assert!(std::mem::size_of_val(words) <= self.len);
        std::ptr::copy_nonoverlapping(self.addr as *const T, words.as_mut_ptr(), words.len());
    }
}

impl Drop for SharedSegment {
    fn drop(&mut self) {
        unsafe {
            if libc::shmdt(self.addr) != 0 {
                tracing::error!(
                    key = self.key,
                    error = %std::io::Error::last_os_error(),
                    "shmdt failed"
                );
            }
            if self.owner && libc::shmctl(self.id, libc::IPC_RMID, std::ptr::null_mut()) != 0 {
                tracing::error!(
                    key = self.key,
                    error = %std::io::Error::last_os_error(),
                    "shmctl(IPC_RMID) failed"
                );
            }
        }
    }
}
