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

// Write-enable gate: toggles a per-device soft read-only switch before a
// write session and restores it on close. Absence of the sysfs files is
// tolerated silently -- the gate degrades to a no-op, per spec.

use std::io::Write;
use std::path::PathBuf;

pub trait WriteGate {
    /// Ensure the device is writeable. Returns whether this call actually
    /// changed the state (so the caller knows whether to reverse it later).
    fn enable(&mut self) -> Result<bool, std::io::Error>;
    /// Reverse a prior `enable()` if it changed the state.
    fn restore(&mut self, did_change: bool) -> Result<(), std::io::Error>;
}

/// Toggles `force_ro` (falling back to `ro`) under a device's sysfs
/// directory, e.g. `/sys/block/mmcblk0boot1/force_ro`.
pub struct SysfsWriteGate {
    dir: Option<PathBuf>,
}

impl SysfsWriteGate {
    pub fn new(sysfs_dir: Option<&str>) -> Self {
        SysfsWriteGate {
            dir: sysfs_dir.map(PathBuf::from),
        }
    }

    fn flag_path(&self) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        let force_ro = dir.join("force_ro");
        if force_ro.exists() {
            return Some(force_ro);
        }
        let ro = dir.join("ro");
        if ro.exists() {
            return Some(ro);
        }
        None
    }

    fn read_flag(path: &PathBuf) -> Result<bool, std::io::Error> {
        Ok(std::fs::read_to_string(path)?.trim() != "0")
    }

    fn write_flag(path: &PathBuf, value: bool) -> Result<(), std::io::Error> {
        let mut f = std::fs::OpenOptions::new().write(true).open(path)?;
        f.write_all(if value { b"1" } else { b"0" })
    }
}

impl WriteGate for SysfsWriteGate {
    fn enable(&mut self) -> Result<bool, std::io::Error> {
        let path = match self.flag_path() {
            Some(p) => p,
            None => {
                log::debug!("write gate: no force_ro/ro file present, treating as no-op");
                return Ok(false);
            }
        };

        let was_ro = Self::read_flag(&path)?;
        if was_ro {
            Self::write_flag(&path, false)?;
        }
        Ok(was_ro)
    }

    fn restore(&mut self, did_change: bool) -> Result<(), std::io::Error> {
        if !did_change {
            return Ok(());
        }
        if let Some(path) = self.flag_path() {
            Self::write_flag(&path, true)?;
        }
        Ok(())
    }
}
