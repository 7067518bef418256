use anyhow::{Result, bail};

use crate::cartridge::{Cartridge, PRG_BANK_SIZE, WORK_RAM_SIZE};

/// Nametable layout derived once from the cartridge flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirroring {
    Horizontal,
    Vertical,
}

/// Translates processor and picture-generator addresses into cartridge
/// memory. Bank switching stays behind this contract; neither engine sees
/// raw program or graphics memory.
pub trait Mapper {
    fn cpu_read(&mut self, addr: u16) -> u8;
    fn cpu_write(&mut self, addr: u16, value: u8);
    fn ppu_read(&mut self, addr: u16) -> u8;
    fn ppu_write(&mut self, addr: u16, value: u8);
    fn mirroring(&self) -> Mirroring;
}

pub fn mapper_name(mapper_id: u8) -> &'static str {
    match mapper_id {
        0 => "NROM",
        2 | 94 | 180 => "UxROM",
        _ => "Unsupported",
    }
}

pub fn create_mapper(cart: Cartridge) -> Result<Box<dyn Mapper>> {
    let mapper: Box<dyn Mapper> = match cart.mapper_id {
        0 => Box::new(Nrom::new(cart)),
        2 | 94 | 180 => Box::new(UxRom::new(cart)),
        id => bail!("unsupported mapper id {id}"),
    };
    Ok(mapper)
}

struct Nrom {
    prg_rom: Vec<u8>,
    chr: Vec<u8>,
    chr_is_ram: bool,
    work_ram: Vec<u8>,
    mirroring: Mirroring,
}

impl Nrom {
    fn new(cart: Cartridge) -> Self {
        Self {
            prg_rom: cart.prg_rom,
            chr: cart.chr_data,
            chr_is_ram: cart.chr_is_ram,
            work_ram: vec![0; WORK_RAM_SIZE],
            mirroring: cart.mirroring,
        }
    }
}

impl Mapper for Nrom {
    fn cpu_read(&mut self, addr: u16) -> u8 {
        match addr {
            0x6000..=0x7FFF => {
                self.work_ram[(addr - 0x6000) as usize % self.work_ram.len()]
            }
            0x8000..=0xFFFF => {
                let mut index = (addr - 0x8000) as usize;
                // A single bank mirrors into both 16KB windows.
                if self.prg_rom.len() == PRG_BANK_SIZE {
                    index %= PRG_BANK_SIZE;
                }
                self.prg_rom[index % self.prg_rom.len()]
            }
            _ => 0,
        }
    }

    fn cpu_write(&mut self, addr: u16, value: u8) {
        if (0x6000..=0x7FFF).contains(&addr) {
            let index = (addr - 0x6000) as usize % self.work_ram.len();
            self.work_ram[index] = value;
        }
    }

    fn ppu_read(&mut self, addr: u16) -> u8 {
        self.chr[addr as usize % self.chr.len()]
    }

    fn ppu_write(&mut self, addr: u16, value: u8) {
        if self.chr_is_ram {
            let index = addr as usize % self.chr.len();
            self.chr[index] = value;
        }
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }
}

struct UxRom {
    prg_rom: Vec<u8>,
    chr: Vec<u8>,
    chr_is_ram: bool,
    work_ram: Vec<u8>,
    bank_select: u8,
    mirroring: Mirroring,
}

impl UxRom {
    fn new(cart: Cartridge) -> Self {
        Self {
            prg_rom: cart.prg_rom,
            chr: cart.chr_data,
            chr_is_ram: cart.chr_is_ram,
            work_ram: vec![0; WORK_RAM_SIZE],
            bank_select: 0,
            mirroring: cart.mirroring,
        }
    }

    fn prg_banks(&self) -> usize {
        (self.prg_rom.len() / PRG_BANK_SIZE).max(1)
    }

    fn read_prg(&self, bank: usize, offset: usize) -> u8 {
        let bank = bank % self.prg_banks();
        self.prg_rom[bank * PRG_BANK_SIZE + offset]
    }
}

impl Mapper for UxRom {
    fn cpu_read(&mut self, addr: u16) -> u8 {
        match addr {
            0x6000..=0x7FFF => {
                self.work_ram[(addr - 0x6000) as usize % self.work_ram.len()]
            }
            0x8000..=0xBFFF => {
                self.read_prg(self.bank_select as usize, (addr - 0x8000) as usize)
            }
            0xC000..=0xFFFF => {
                self.read_prg(self.prg_banks() - 1, (addr - 0xC000) as usize)
            }
            _ => 0,
        }
    }

    fn cpu_write(&mut self, addr: u16, value: u8) {
        match addr {
            // Any store into the ROM window updates the bank register.
            0x8000..=0xFFFF => {
                self.bank_select = value & 0x0F;
            }
            0x6000..=0x7FFF => {
                let index = (addr - 0x6000) as usize % self.work_ram.len();
                self.work_ram[index] = value;
            }
            _ => {}
        }
    }

    fn ppu_read(&mut self, addr: u16) -> u8 {
        self.chr[addr as usize % self.chr.len()]
    }

    fn ppu_write(&mut self, addr: u16, value: u8) {
        if self.chr_is_ram {
            let index = addr as usize % self.chr.len();
            self.chr[index] = value;
        }
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }
}
