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

// On-disk header sector layout (spec.md section 3) and its CRC-32. Header
// integers are serialized little-endian explicitly rather than relying on
// native struct layout, so that two slots are comparable byte-for-byte
// regardless of host endianness (the format itself is not portable).

use crc::{Crc, CRC_32_ISO_HDLC};

pub const MAGIC: &[u8; 8] = b"BOOTINFO";
pub const VERSION: u16 = 4;

pub const FLAG_BOOT_IN_PROGRESS: u8 = 0x01;

/// Size of the header sector's fixed fields, up to and including `ext_sectors`.
/// magic(8) + version(2) + flags(1) + failed_boots(1) + header_crc(4)
/// + sernum(1) + reserved(1) + ext_sectors(2) = 20 bytes.
pub const HEADER_FIXED_LEN: usize = 8 + 2 + 1 + 1 + 4 + 1 + 1 + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub flags: u8,
    pub failed_boots: u8,
    pub header_crc: u32,
    pub sernum: u8,
    pub ext_sectors: u16,
}

impl Header {
    pub fn is_in_progress(&self) -> bool {
        self.flags & FLAG_BOOT_IN_PROGRESS != 0
    }

    pub fn set_in_progress(&mut self, value: bool) {
        if value {
            self.flags |= FLAG_BOOT_IN_PROGRESS;
        } else {
            self.flags &= !FLAG_BOOT_IN_PROGRESS;
        }
    }

    /// Parse a header sector. Only checks magic/version/ext_sectors; the
    /// caller is responsible for the separate extension-area CRC check that
    /// actually decides slot validity.
    pub fn parse(sector: &[u8], expected_ext_sectors: u16) -> Option<Header> {
        if sector.len() < HEADER_FIXED_LEN {
            return None;
        }
        if &sector[0..8] != MAGIC.as_slice() {
            return None;
        }
        let version = u16::from_le_bytes([sector[8], sector[9]]);
        if version < VERSION {
            return None;
        }
        let flags = sector[10];
        let failed_boots = sector[11];
        let header_crc = u32::from_le_bytes([sector[12], sector[13], sector[14], sector[15]]);
        let sernum = sector[16];
        // sector[17] is reserved.
        let ext_sectors = u16::from_le_bytes([sector[18], sector[19]]);
        if ext_sectors != expected_ext_sectors {
            return None;
        }

        Some(Header {
            version,
            flags,
            failed_boots,
            header_crc,
            sernum,
            ext_sectors,
        })
    }

    /// Verify the header CRC against a full header sector. The CRC is
    /// computed, on both write and verify, with the `header_crc` field
    /// itself zeroed -- the same convention the rest of the header-sector
    /// covers. Only used when `Config::verify_header_crc` is set.
    pub fn verify_crc(&self, sector: &[u8]) -> bool {
        let mut copy = sector.to_vec();
        copy[12..16].fill(0);
        crc32(&copy) == self.header_crc
    }

    /// Write this header's fixed fields into the front of `sector`
    /// (`sector.len() >= HEADER_FIXED_LEN`), with `header_crc` left as
    /// whatever the caller put there (usually 0, to be filled in afterward).
    pub fn write_into(&self, sector: &mut [u8]) {
        sector[0..8].copy_from_slice(MAGIC.as_slice());
        sector[8..10].copy_from_slice(&self.version.to_le_bytes());
        sector[10] = self.flags;
        sector[11] = self.failed_boots;
        sector[12..16].copy_from_slice(&self.header_crc.to_le_bytes());
        sector[16] = self.sernum;
        sector[17] = 0;
        sector[18..20].copy_from_slice(&self.ext_sectors.to_le_bytes());
    }
}

/// CRC-32, zlib/ISO-HDLC variant (polynomial 0xEDB88320), as spec.md section 6
/// requires.
pub fn crc32(data: &[u8]) -> u32 {
    let algo = Crc::<u32>::new(&CRC_32_ISO_HDLC);
    algo.checksum(data)
}

/// Compare two 8-bit serials under wraparound rules (spec.md section 4.4):
/// the numerically greater serial wins except at the 255/0 wrap boundary,
/// where the post-wrap value (0) is treated as newer than 255.
pub fn serial_is_newer(candidate: u8, current: u8) -> bool {
    if current == 255 && candidate == 0 {
        true
    } else if current == 0 && candidate == 255 {
        false
    } else {
        candidate > current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraparound_selection() {
        assert!(serial_is_newer(0, 255));
        assert!(!serial_is_newer(255, 0));
        assert!(serial_is_newer(5, 4));
        assert!(!serial_is_newer(4, 5));
    }

    #[test]
    fn header_roundtrip() {
        let h = Header {
            version: VERSION,
            flags: FLAG_BOOT_IN_PROGRESS,
            failed_boots: 3,
            header_crc: 0,
            sernum: 7,
            ext_sectors: 1023,
        };
        let mut sector = vec![0u8; HEADER_FIXED_LEN];
        h.write_into(&mut sector);
        let parsed = Header::parse(&sector, 1023).expect("valid header");
        assert_eq!(parsed.flags, FLAG_BOOT_IN_PROGRESS);
        assert_eq!(parsed.failed_boots, 3);
        assert_eq!(parsed.sernum, 7);
        assert!(parsed.is_in_progress());
    }

    #[test]
    fn bad_magic_rejected() {
        let mut sector = vec![0u8; HEADER_FIXED_LEN];
        sector[0..8].copy_from_slice(b"NOTBOOTI");
        assert!(Header::parse(&sector, 1023).is_none());
    }
}
