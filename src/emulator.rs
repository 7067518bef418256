use std::collections::VecDeque;

use anyhow::Result;

use crate::bus::Bus;
use crate::cartridge::Cartridge;
use crate::controller::Controller;
use crate::cpu::Cpu;
use crate::mapper::{create_mapper, mapper_name};
use crate::ppu::Ppu;

/// The picture generator runs three dots for every processor cycle.
pub const PPU_DOTS_PER_CPU_CYCLE: u32 = 3;

const MAX_EVENTS: usize = 64;

/// Owns the processor and the bus (which in turn owns the picture
/// generator, sound stub, controllers, and mapper) and drives them in
/// strict alternation: one instruction, then 3×C dots, then C sound steps.
pub struct Emulator {
    cpu: Cpu,
    bus: Bus,
    mapper_name: &'static str,

    is_running: bool,
    step_mode: bool,
    should_step: bool,
    should_reset: bool,

    events: VecDeque<String>,
}

impl Emulator {
    pub fn new(cartridge: Cartridge) -> Result<Self> {
        let mapper_name = mapper_name(cartridge.mapper_id);
        let mapper = create_mapper(cartridge)?;

        let mut bus = Bus::new(mapper);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);

        let mut emulator = Self {
            cpu,
            bus,
            mapper_name,
            is_running: false,
            step_mode: false,
            should_step: false,
            should_reset: false,
            events: VecDeque::with_capacity(MAX_EVENTS),
        };
        emulator.push_event(format!(
            "cartridge loaded: {}, reset vector ${:04X}",
            emulator.mapper_name,
            emulator.cpu.pc()
        ));
        Ok(emulator)
    }

    pub fn start(&mut self) {
        self.is_running = true;
    }

    pub fn stop(&mut self) {
        self.is_running = false;
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    /// Applied at the next tick boundary, never mid-step.
    pub fn request_reset(&mut self) {
        self.should_reset = true;
    }

    pub fn set_step_mode(&mut self, enabled: bool) {
        self.step_mode = enabled;
    }

    pub fn request_step(&mut self) {
        self.should_step = true;
    }

    /// Runs until the picture generator completes the current frame, or
    /// returns early when single-step mode is waiting for permission.
    pub fn frame(&mut self) {
        let mut start_parity = self.bus.ppu.odd_frame();

        while self.is_running && self.bus.ppu.odd_frame() == start_parity {
            if self.step_mode && !self.should_step {
                return;
            }
            self.should_step = false;

            if self.should_reset {
                self.reset();
                start_parity = self.bus.ppu.odd_frame();
            }

            self.tick();
        }
    }

    fn tick(&mut self) {
        let cycles = self.cpu.step(&mut self.bus);

        if let Some(page) = self.bus.take_dma_request() {
            self.start_dma(page);
        }

        for _ in 0..cycles * PPU_DOTS_PER_CPU_CYCLE {
            self.bus.ppu.step(self.bus.mapper.as_mut());
            if self.bus.ppu.take_nmi() {
                self.cpu.raise_nmi();
            }
        }

        for _ in 0..cycles {
            self.bus.apu.step();
        }
    }

    pub fn raise_nmi(&mut self) {
        self.cpu.raise_nmi();
    }

    pub fn start_dma(&mut self, page: u8) {
        self.cpu.begin_dma(page);
    }

    fn reset(&mut self) {
        self.should_reset = false;
        self.cpu.reset(&mut self.bus);
        self.bus.ppu.reset();
        self.bus.apu.reset();
        self.push_event(format!("reset, PC=${:04X}", self.cpu.pc()));
    }

    pub fn frame_buffer(&self) -> &[u8] {
        self.bus.ppu.frame_buffer()
    }

    pub fn total_frames(&self) -> u64 {
        self.bus.ppu.total_frames()
    }

    pub fn mapper_name(&self) -> &'static str {
        self.mapper_name
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn ppu(&self) -> &Ppu {
        &self.bus.ppu
    }

    pub fn controller_one(&mut self) -> &mut Controller {
        &mut self.bus.controller_one
    }

    pub fn controller_two(&mut self) -> &mut Controller {
        &mut self.bus.controller_two
    }

    pub fn peek_ram(&self, addr: u16) -> u8 {
        self.bus.peek_ram(addr)
    }

    pub fn recent_events(&self, limit: usize) -> Vec<String> {
        self.events.iter().rev().take(limit).cloned().collect()
    }

    fn push_event<S: Into<String>>(&mut self, event: S) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(event.into());
    }
}
