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

// Session lifecycle: open/initialize/close orchestration, boot-state
// mutators, and getters (spec.md sections 4.5, 4.6).

use crate::block::{BlockDevice, FileBlockDevice};
use crate::config::Config;
use crate::error::BootInfoError;
use crate::gate::{SysfsWriteGate, WriteGate};
use crate::header::Header;
use crate::lock::SessionLock;
use crate::slot::{self, variable_area_capacity};
use crate::vars::VarTable;

bitflags::bitflags! {
    pub struct OpenFlags: u32 {
        const READ_ONLY  = 0b0001;
        const FORCE_INIT = 0b0010;
    }
}

/// The in-memory session handle described by spec.md section 3 as a
/// "context": created by open, mutated by setters/mark calls, persisted by
/// update, destroyed by close.
pub struct BootInfoContext {
    cfg: Config,
    read_only: bool,
    degraded_read_only: bool,
    device: Box<dyn BlockDevice>,
    gate: Option<SysfsWriteGate>,
    gate_changed: bool,
    _lock: SessionLock,
    current: Option<usize>,
    header: Header,
    vars: VarTable,
}

impl BootInfoContext {
    pub fn open(cfg: Config, flags: OpenFlags) -> Result<Self, BootInfoError> {
        let read_only = flags.contains(OpenFlags::READ_ONLY);
        let force_init = flags.contains(OpenFlags::FORCE_INIT);

        if read_only && force_init {
            return Err(BootInfoError::InvalidArgument);
        }
        Self::validate_config(&cfg)?;

        let device_path = cfg
            .candidate_paths
            .iter()
            .map(std::path::Path::new)
            .find(|p| p.exists())
            .ok_or(BootInfoError::NoDevice)?
            .to_path_buf();

        let lock = SessionLock::acquire(
            std::path::Path::new(&cfg.lock_dir),
            &cfg.lockfile_path(),
            cfg.lock_dir_group.as_deref(),
            !read_only,
        )?;

        let mut gate = if read_only {
            None
        } else {
            Some(SysfsWriteGate::new(cfg.write_gate_sysfs_dir.as_deref()))
        };

        let gate_changed = if let Some(g) = gate.as_mut() {
            match g.enable() {
                Ok(changed) => changed,
                Err(e) => return Err(BootInfoError::Io(e)),
            }
        } else {
            false
        };

        let device: Box<dyn BlockDevice> = if read_only {
            Box::new(FileBlockDevice::open_read_only(&device_path)?)
        } else {
            Box::new(FileBlockDevice::open_read_write(&device_path)?)
        };

        let mut ctx = BootInfoContext {
            cfg,
            read_only,
            degraded_read_only: false,
            device,
            gate,
            gate_changed,
            _lock: lock,
            current: None,
            header: Header {
                version: crate::header::VERSION,
                flags: 0,
                failed_boots: 0,
                header_crc: 0,
                sernum: 0,
                ext_sectors: 0,
            },
            vars: VarTable::new(),
        };

        ctx.load()?;

        if !read_only && (ctx.current.is_none() || force_init) {
            ctx.reinitialize()?;
        } else if read_only && ctx.current.is_none() {
            return Err(BootInfoError::NoValidStore);
        }

        Ok(ctx)
    }

    /// Reject configurations that would violate the record-layout invariants
    /// (spec.md section 3) before any device I/O is attempted, rather than
    /// risking an arithmetic panic deep in the slot codec.
    fn validate_config(cfg: &Config) -> Result<(), BootInfoError> {
        if cfg.ext_sectors < 1 || cfg.ext_sectors > 1023 {
            return Err(BootInfoError::InvalidArgument);
        }
        if cfg.slot_a_offset % crate::config::SECTOR_SIZE as u64 != 0
            || cfg.slot_b_offset % crate::config::SECTOR_SIZE as u64 != 0
        {
            return Err(BootInfoError::InvalidArgument);
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), BootInfoError> {
        let slots = slot::load_slots(self.device.as_mut(), &self.cfg)?;
        let current = slot::select(&slots);
        self.current = current;

        if let Some(idx) = current {
            self.header = slots[idx].header;
            let capacity = variable_area_capacity(&self.cfg);
            let crc_off = self.cfg.slot_size() as usize - 4;
            let area = &slots[idx].buffer[crate::header::HEADER_FIXED_LEN..crc_off];
            debug_assert!(area.len() <= capacity + 4);
            let (vars, parse_failed) = VarTable::parse(area);
            self.vars = vars;
            if parse_failed {
                log::warn!("variable area parse failed structurally; degrading session to read-only");
                self.degraded_read_only = true;
            }
        }
        Ok(())
    }

    /// Re-initialization: snapshot underscore-prefixed variables, zero both
    /// slots, reset in-memory state, then persist (spec.md section 4.4).
    fn reinitialize(&mut self) -> Result<(), BootInfoError> {
        if self.read_only {
            return Err(BootInfoError::ReadOnly);
        }

        let preserved = self.vars.underscore_prefixed();

        slot::zero_both_slots(self.device.as_mut(), &self.cfg)?;

        self.current = None;
        self.degraded_read_only = false;
        self.header = Header {
            version: crate::header::VERSION,
            flags: 0,
            failed_boots: 0,
            header_crc: 0,
            sernum: 0,
            ext_sectors: self.cfg.ext_sectors,
        };
        self.vars = preserved;

        self.update()
    }

    /// Persist the in-memory state to the "other" (never the currently
    /// valid) slot, then implicitly promote it via its incremented serial.
    pub fn update(&mut self) -> Result<(), BootInfoError> {
        if self.read_only {
            return Err(BootInfoError::ReadOnly);
        }
        if self.degraded_read_only {
            return Err(BootInfoError::ReadOnly);
        }

        let (dest, header) = slot::persist(
            self.device.as_mut(),
            &self.cfg,
            self.current,
            self.header.sernum,
            self.header.flags,
            self.header.failed_boots,
            &self.vars,
        )?;

        self.current = Some(dest);
        self.header = header;
        Ok(())
    }

    pub fn set(&mut self, name: &str, value: Option<&str>) -> Result<(), BootInfoError> {
        if self.read_only || self.degraded_read_only {
            return Err(BootInfoError::ReadOnly);
        }
        let capacity = variable_area_capacity(&self.cfg);
        self.vars.set(name, value, capacity)
    }

    pub fn get(&self, name: &str) -> Result<&str, BootInfoError> {
        self.vars.get(name).ok_or(BootInfoError::NotFound)
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter()
    }

    /// Second consecutive attempt without an intervening success increments
    /// `failed_boots` (saturating); the first sets BOOT_IN_PROGRESS. Returns
    /// the post-update failed-boot count.
    pub fn mark_in_progress(&mut self) -> Result<u8, BootInfoError> {
        if self.read_only || self.degraded_read_only {
            return Err(BootInfoError::ReadOnly);
        }

        if self.header.is_in_progress() {
            self.header.failed_boots = self.header.failed_boots.saturating_add(1);
        } else {
            self.header.set_in_progress(true);
        }

        self.update()?;
        Ok(self.header.failed_boots)
    }

    /// Clears BOOT_IN_PROGRESS and zeroes `failed_boots`. Returns the
    /// pre-zero failed-boot count.
    pub fn mark_successful(&mut self) -> Result<u8, BootInfoError> {
        if self.read_only || self.degraded_read_only {
            return Err(BootInfoError::ReadOnly);
        }

        let previous = self.header.failed_boots;
        self.header.set_in_progress(false);
        self.header.failed_boots = 0;
        self.update()?;
        Ok(previous)
    }

    pub fn is_in_progress(&self) -> bool {
        self.header.is_in_progress()
    }

    pub fn failed_boot_count(&self) -> u8 {
        self.header.failed_boots
    }

    pub fn devinfo_version(&self) -> u16 {
        self.header.version
    }

    pub fn extension_sectors(&self) -> u16 {
        self.cfg.ext_sectors
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only || self.degraded_read_only
    }

    pub fn close(mut self) -> Result<(), BootInfoError> {
        self.close_mut()
    }

    fn close_mut(&mut self) -> Result<(), BootInfoError> {
        if let Some(gate) = self.gate.as_mut() {
            gate.restore(self.gate_changed)?;
            self.gate_changed = false;
        }
        Ok(())
    }
}

impl Drop for BootInfoContext {
    fn drop(&mut self) {
        let _ = self.close_mut();
    }
}
