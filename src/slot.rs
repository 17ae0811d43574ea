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

// Slot codec, selector, and persistence (spec.md section 4.4). A slot is
// `1 + E` 512-byte sectors: a header sector followed by the extension area,
// with a trailing 4-byte CRC-32 over the extension area.

use crate::block::BlockDevice;
use crate::config::{Config, SECTOR_SIZE};
use crate::error::BootInfoError;
use crate::header::{crc32, serial_is_newer, Header, HEADER_FIXED_LEN, VERSION};
use crate::vars::VarTable;

pub struct LoadedSlot {
    pub header: Header,
    pub valid: bool,
    /// Full slot buffer (header sector + extension area), present even when
    /// invalid so a degrade-to-read-only parse can still be attempted.
    pub buffer: Vec<u8>,
}

/// Offset of the trailing CRC from the start of the slot.
fn trailing_crc_offset(slot_size: u64) -> usize {
    slot_size as usize - 4
}

/// The usable variable-area capacity: everything between the end of the
/// header's fixed fields and the trailing CRC.
pub fn variable_area_capacity(cfg: &Config) -> usize {
    trailing_crc_offset(cfg.slot_size()) - HEADER_FIXED_LEN
}

fn read_slot(
    device: &mut dyn BlockDevice,
    offset: u64,
    cfg: &Config,
) -> Result<LoadedSlot, BootInfoError> {
    let slot_size = cfg.slot_size() as usize;
    let mut buffer = vec![0u8; slot_size];

    device.read_at(offset, &mut buffer[0..SECTOR_SIZE])?;

    let header = match Header::parse(&buffer[0..SECTOR_SIZE], cfg.ext_sectors) {
        Some(h) => h,
        None => {
            return Ok(LoadedSlot {
                header: zero_header(cfg),
                valid: false,
                buffer,
            });
        }
    };

    device.read_at(offset + SECTOR_SIZE as u64, &mut buffer[SECTOR_SIZE..])?;

    let crc_off = trailing_crc_offset(slot_size);
    let stored_crc = u32::from_le_bytes([
        buffer[crc_off],
        buffer[crc_off + 1],
        buffer[crc_off + 2],
        buffer[crc_off + 3],
    ]);
    let computed_crc = crc32(&buffer[SECTOR_SIZE..crc_off]);
    let mut valid = stored_crc == computed_crc;

    if valid && cfg.verify_header_crc {
        valid = header.verify_crc(&buffer[0..SECTOR_SIZE]);
    }

    Ok(LoadedSlot {
        header,
        valid,
        buffer,
    })
}

fn zero_header(cfg: &Config) -> Header {
    Header {
        version: VERSION,
        flags: 0,
        failed_boots: 0,
        header_crc: 0,
        sernum: 0,
        ext_sectors: cfg.ext_sectors,
    }
}

/// Load both slots from the device.
pub fn load_slots(
    device: &mut dyn BlockDevice,
    cfg: &Config,
) -> Result<[LoadedSlot; 2], BootInfoError> {
    let s0 = read_slot(device, cfg.slot_a_offset, cfg)?;
    let s1 = read_slot(device, cfg.slot_b_offset, cfg)?;
    Ok([s0, s1])
}

/// Which slot is current: `Some(0)`/`Some(1)` or `None` if neither is valid.
pub fn select(slots: &[LoadedSlot; 2]) -> Option<usize> {
    match (slots[0].valid, slots[1].valid) {
        (true, false) => Some(0),
        (false, true) => Some(1),
        (false, false) => None,
        (true, true) => {
            let s0 = slots[0].header.sernum;
            let s1 = slots[1].header.sernum;
            if s0 == s1 {
                // Undefined by spec when both are fully valid with equal
                // serials; slot 0 is chosen deterministically.
                Some(0)
            } else if serial_is_newer(s1, s0) {
                Some(1)
            } else {
                Some(0)
            }
        }
    }
}

fn offset_of(cfg: &Config, slot_index: usize) -> u64 {
    if slot_index == 0 {
        cfg.slot_a_offset
    } else {
        cfg.slot_b_offset
    }
}

/// Build and write the destination slot: the slot that is *not* the
/// currently-valid one, with an incremented serial. The previously-current
/// slot is never touched.
pub fn persist(
    device: &mut dyn BlockDevice,
    cfg: &Config,
    current: Option<usize>,
    current_sernum: u8,
    header_flags: u8,
    header_failed_boots: u8,
    vars: &VarTable,
) -> Result<(usize, Header), BootInfoError> {
    let dest_index = match current {
        Some(c) => 1 - c,
        None => 0,
    };

    let slot_size = cfg.slot_size() as usize;
    let crc_off = trailing_crc_offset(slot_size);
    let capacity = variable_area_capacity(cfg);

    if vars.serialized_len() > capacity {
        return Err(BootInfoError::Oversize);
    }

    let mut buffer = vec![0u8; slot_size];

    let new_sernum = current_sernum.wrapping_add(1);
    let header = Header {
        version: VERSION,
        flags: header_flags,
        failed_boots: header_failed_boots,
        header_crc: 0,
        sernum: new_sernum,
        ext_sectors: cfg.ext_sectors,
    };

    header.write_into(&mut buffer[0..SECTOR_SIZE]);
    vars.serialize(&mut buffer[HEADER_FIXED_LEN..crc_off], capacity)?;

    let header_crc = crc32(&buffer[0..SECTOR_SIZE]);
    buffer[12..16].copy_from_slice(&header_crc.to_le_bytes());
    let final_header = Header { header_crc, ..header };

    let ext_crc = crc32(&buffer[SECTOR_SIZE..crc_off]);
    buffer[crc_off..crc_off + 4].copy_from_slice(&ext_crc.to_le_bytes());

    let offset = offset_of(cfg, dest_index);
    device.write_at(offset, &buffer[0..SECTOR_SIZE])?;
    device.write_at(offset + SECTOR_SIZE as u64, &buffer[SECTOR_SIZE..])?;
    device.flush()?;

    Ok((dest_index, final_header))
}

/// Zero-fill both slots entirely, sequenced slot-0 header, slot-0 extension,
/// slot-1 header, slot-1 extension, as spec.md section 4.4 requires for
/// re-initialization so a crash mid-way still leaves both slots failing
/// magic on the next load.
pub fn zero_both_slots(device: &mut dyn BlockDevice, cfg: &Config) -> Result<(), BootInfoError> {
    let zero_sector = vec![0u8; SECTOR_SIZE];
    let zero_ext = vec![0u8; cfg.slot_size() as usize - SECTOR_SIZE];

    for &base in &[cfg.slot_a_offset, cfg.slot_b_offset] {
        device.write_at(base, &zero_sector)?;
        device.write_at(base + SECTOR_SIZE as u64, &zero_ext)?;
    }
    device.flush()?;
    Ok(())
}
