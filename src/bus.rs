use crate::apu::Apu;
use crate::controller::Controller;
use crate::mapper::Mapper;
use crate::ppu::Ppu;

pub const RAM_SIZE: usize = 0x800;

const RAM_END: u16 = 0x1FFF;
const PPU_REGISTERS_START: u16 = 0x2000;
const PPU_REGISTERS_END: u16 = 0x3FFF;
const OAM_DMA_ADDRESS: u16 = 0x4014;
const CONTROLLER_ONE_ADDRESS: u16 = 0x4016;
const CONTROLLER_TWO_ADDRESS: u16 = 0x4017;
const APU_IO_END: u16 = 0x4017;
const TEST_MODE_END: u16 = 0x401F;

/// Byte-level access to the processor's address space.
pub trait CpuBus {
    fn read(&mut self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, value: u8);
}

/// The processor-side memory map: routes each access to internal RAM, the
/// picture generator's registers, the sound/input ports, or the mapper.
pub struct Bus {
    ram: [u8; RAM_SIZE],
    pub(crate) ppu: Ppu,
    pub(crate) apu: Apu,
    pub(crate) controller_one: Controller,
    pub(crate) controller_two: Controller,
    pub(crate) mapper: Box<dyn Mapper>,
    dma_request: Option<u8>,
    open_bus: u8,
}

impl Bus {
    pub fn new(mapper: Box<dyn Mapper>) -> Self {
        Self {
            ram: [0; RAM_SIZE],
            ppu: Ppu::new(),
            apu: Apu::new(),
            controller_one: Controller::new(),
            controller_two: Controller::new(),
            mapper,
            dma_request: None,
            open_bus: 0,
        }
    }

    /// Page recorded by the last write to the DMA trigger address, if any.
    pub fn take_dma_request(&mut self) -> Option<u8> {
        self.dma_request.take()
    }

    pub fn peek_ram(&self, addr: u16) -> u8 {
        self.ram[addr as usize % RAM_SIZE]
    }

    fn fold_ppu_register(addr: u16) -> u16 {
        // The eight registers mirror every 8 bytes up to 0x3FFF.
        PPU_REGISTERS_START + (addr & 0x0007)
    }
}

impl CpuBus for Bus {
    fn read(&mut self, addr: u16) -> u8 {
        let value = match addr {
            0x0000..=RAM_END => self.ram[addr as usize % RAM_SIZE],
            PPU_REGISTERS_START..=PPU_REGISTERS_END => self
                .ppu
                .read_register(Self::fold_ppu_register(addr), self.mapper.as_mut()),
            CONTROLLER_ONE_ADDRESS => self.controller_one.read(),
            CONTROLLER_TWO_ADDRESS => self.controller_two.read(),
            // Sound registers are write-only from the processor's view;
            // reads here land on the open bus.
            0x4000..=TEST_MODE_END => self.open_bus,
            _ => self.mapper.cpu_read(addr),
        };
        self.open_bus = value;
        value
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.open_bus = value;
        match addr {
            0x0000..=RAM_END => {
                self.ram[addr as usize % RAM_SIZE] = value;
            }
            PPU_REGISTERS_START..=PPU_REGISTERS_END => {
                self.ppu
                    .write_register(Self::fold_ppu_register(addr), value, self.mapper.as_mut());
            }
            OAM_DMA_ADDRESS => {
                self.dma_request = Some(value);
            }
            CONTROLLER_ONE_ADDRESS => {
                self.controller_one.write_strobe(value);
                self.controller_two.write_strobe(value);
            }
            0x4000..=APU_IO_END => {
                self.apu.write_register(addr, value);
            }
            0x4018..=TEST_MODE_END => {}
            _ => self.mapper.cpu_write(addr, value),
        }
    }
}
