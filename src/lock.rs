/*
   Licensed under the Apache License, Version 2.0 (the "License");
   you may not use this file except in compliance with the License.
   You may obtain a copy of the License at

      http://www.apache.org/licenses/LICENSE-2.0

   Unless required by applicable law or agreed to in writing, software
   distributed under the License is distributed on an "AS IS" BASIS,
   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
   See the License for the specific language governing permissions and
   limitations under the License.
*/

// Exclusive-access locking: a filesystem lockfile under a well-known runtime
// directory, shared for read sessions and exclusive for write sessions. Held
// for the whole session, including across the re-initialization path.

use std::fs::OpenOptions;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use nix::fcntl::{flock, FlockArg};

use pal::permissions::{DefaultAttributes, DefaultImpl};

use crate::error::BootInfoError;

pub struct SessionLock {
    file: std::fs::File,
}

impl SessionLock {
    /// Create the lock directory (mode 02770, group per `group`) if it does
    /// not exist, then open and lock `lockfile_path` -- shared if `exclusive`
    /// is false, exclusive otherwise. The lock is held until this value is
    /// dropped.
    pub fn acquire(
        lock_dir: &Path,
        lockfile_path: &Path,
        group: Option<&str>,
        exclusive: bool,
    ) -> Result<Self, BootInfoError> {
        Self::ensure_lock_dir(lock_dir, group)
            .map_err(|e| BootInfoError::LockError(format!("cannot create {:?}: {}", lock_dir, e)))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(lockfile_path)
            .map_err(|e| BootInfoError::LockError(format!("cannot open {:?}: {}", lockfile_path, e)))?;

        let arg = if exclusive {
            FlockArg::LockExclusive
        } else {
            FlockArg::LockShared
        };

        flock(file.as_raw_fd(), arg)
            .map_err(|e| BootInfoError::LockError(format!("flock failed: {}", e)))?;

        Ok(SessionLock { file })
    }

    fn ensure_lock_dir(dir: &Path, group: Option<&str>) -> Result<(), std::io::Error> {
        if dir.exists() {
            return Ok(());
        }

        std::fs::create_dir_all(dir)?;

        use std::os::unix::fs::PermissionsExt;
        let attrs = DefaultImpl::get_directory_attributes(dir);
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o2770))?;

        let gid = match group {
            Some(name) => Self::lookup_group(name).unwrap_or(attrs.group),
            None => attrs.group,
        };

        // chown is best-effort: under test or non-root contexts it may fail
        // with EPERM, which must not block the lock directory from existing.
        let c_path = std::ffi::CString::new(dir.as_os_str().to_str().unwrap_or_default())
            .unwrap_or_default();
        let ret = unsafe { libc::chown(c_path.as_ptr(), attrs.owner, gid) };
        if ret != 0 {
            log::debug!("chown of lock dir {:?} failed, continuing", dir);
        }

        Ok(())
    }

    fn lookup_group(name: &str) -> Option<libc::gid_t> {
        let c_name = std::ffi::CString::new(name).ok()?;
        let grp = unsafe { libc::getgrnam(c_name.as_ptr()) };
        if grp.is_null() {
            None
        } else {
            Some(unsafe { (*grp).gr_gid })
        }
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        let _ = flock(self.file.as_raw_fd(), FlockArg::Unlock);
    }
}
