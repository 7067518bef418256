use anyhow::{Context, Result, bail};
use std::{fs, path::Path};

use crate::mapper::Mirroring;

pub const PRG_BANK_SIZE: usize = 16 * 1024;
pub const CHR_BANK_SIZE: usize = 8 * 1024;
pub const WORK_RAM_SIZE: usize = 8 * 1024;

const HEADER_SIZE: usize = 16;
const TRAINER_SIZE: usize = 512;

const FLAG6_VERTICAL_MIRRORING: u8 = 0x01;
const FLAG6_BATTERY_BACKED_RAM: u8 = 0x02;
const FLAG6_TRAINER: u8 = 0x04;

/// Raw cartridge memory parsed from an iNES image. Created once at load
/// time; only work RAM and CHR RAM (when present) are writable afterwards.
#[derive(Debug, Clone)]
pub struct Cartridge {
    pub mapper_id: u8,
    pub mirroring: Mirroring,
    pub has_battery_backed_ram: bool,
    pub prg_rom: Vec<u8>,
    pub chr_data: Vec<u8>,
    pub chr_is_ram: bool,
}

impl Cartridge {
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read ROM: {}", path.display()))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            bail!("ROM is too small to contain an iNES header");
        }
        if &bytes[0..4] != b"NES\x1A" {
            bail!("invalid iNES header magic, expected NES<EOF>");
        }

        let prg_banks = (bytes[4] as usize).max(1);
        let chr_banks = bytes[5] as usize;
        let flags6 = bytes[6];
        let flags7 = bytes[7];

        let mapper_id = (flags7 & 0xF0) | (flags6 >> 4);
        let mirroring = if (flags6 & FLAG6_VERTICAL_MIRRORING) != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };
        let has_battery_backed_ram = (flags6 & FLAG6_BATTERY_BACKED_RAM) != 0;

        let mut cursor = HEADER_SIZE;
        if (flags6 & FLAG6_TRAINER) != 0 {
            cursor += TRAINER_SIZE;
        }

        let prg_rom_size = prg_banks * PRG_BANK_SIZE;
        if bytes.len() < cursor + prg_rom_size {
            bail!("ROM truncated: expected {prg_rom_size} PRG bytes but file ended early");
        }
        let prg_rom = bytes[cursor..cursor + prg_rom_size].to_vec();
        cursor += prg_rom_size;

        // A CHR bank count of zero means the cartridge carries writable
        // graphics RAM instead of ROM.
        let (chr_data, chr_is_ram) = if chr_banks == 0 {
            (vec![0; CHR_BANK_SIZE], true)
        } else {
            let chr_rom_size = chr_banks * CHR_BANK_SIZE;
            if bytes.len() < cursor + chr_rom_size {
                bail!("ROM truncated: expected {chr_rom_size} CHR bytes but file ended early");
            }
            (bytes[cursor..cursor + chr_rom_size].to_vec(), false)
        };

        Ok(Self {
            mapper_id,
            mirroring,
            has_battery_backed_ram,
            prg_rom,
            chr_data,
            chr_is_ram,
        })
    }
}
