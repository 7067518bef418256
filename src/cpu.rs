use crate::bus::CpuBus;

pub(crate) const FLAG_CARRY: u8 = 0x01;
pub(crate) const FLAG_ZERO: u8 = 0x02;
pub(crate) const FLAG_INTERRUPT: u8 = 0x04;
pub(crate) const FLAG_DECIMAL: u8 = 0x08;
pub(crate) const FLAG_BREAK: u8 = 0x10;
pub(crate) const FLAG_UNUSED: u8 = 0x20;
pub(crate) const FLAG_OVERFLOW: u8 = 0x40;
pub(crate) const FLAG_NEGATIVE: u8 = 0x80;

const STACK_BASE: u16 = 0x0100;

const NMI_VECTOR: u16 = 0xFFFA;
const RESET_VECTOR: u16 = 0xFFFC;
const IRQ_BRK_VECTOR: u16 = 0xFFFE;

const INTERRUPT_CYCLES: u32 = 7;
const OAM_DATA_ADDRESS: u16 = 0x2004;

// OAM DMA is 513 CPU cycles when started on an even cycle count, 514 on odd.
const DMA_TRANSFER_CYCLES: u32 = 513;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Relative,
    Indirect,
    IndirectX,
    IndirectY,
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Adc,
    And,
    Asl,
    Bcc,
    Bcs,
    Beq,
    Bit,
    Bmi,
    Bne,
    Bpl,
    Brk,
    Bvc,
    Bvs,
    Clc,
    Cld,
    Cli,
    Clv,
    Cmp,
    Cpx,
    Cpy,
    Dec,
    Dex,
    Dey,
    Eor,
    Inc,
    Inx,
    Iny,
    Jmp,
    Jsr,
    Lda,
    Ldx,
    Ldy,
    Lsr,
    Nop,
    Ora,
    Pha,
    Php,
    Pla,
    Plp,
    Rol,
    Ror,
    Rti,
    Rts,
    Sbc,
    Sec,
    Sed,
    Sei,
    Sta,
    Stx,
    Sty,
    Tax,
    Tay,
    Tsx,
    Txa,
    Txs,
    Tya,
}

#[derive(Debug, Clone, Copy)]
struct Opcode {
    op: Op,
    mode: Mode,
    size: u8,
    cycles: u8,
    page_cycle: bool,
}

const fn op(op: Op, mode: Mode, size: u8, cycles: u8) -> Option<Opcode> {
    Some(Opcode {
        op,
        mode,
        size,
        cycles,
        page_cycle: false,
    })
}

const fn op_pg(op: Op, mode: Mode, size: u8, cycles: u8) -> Option<Opcode> {
    Some(Opcode {
        op,
        mode,
        size,
        cycles,
        page_cycle: true,
    })
}

static OPCODE_TABLE: [Option<Opcode>; 256] = opcode_table();

const fn opcode_table() -> [Option<Opcode>; 256] {
    let mut t: [Option<Opcode>; 256] = [None; 256];

    t[0x69] = op(Op::Adc, Mode::Immediate, 2, 2);
    t[0x65] = op(Op::Adc, Mode::ZeroPage, 2, 3);
    t[0x75] = op(Op::Adc, Mode::ZeroPageX, 2, 4);
    t[0x6D] = op(Op::Adc, Mode::Absolute, 3, 4);
    t[0x7D] = op_pg(Op::Adc, Mode::AbsoluteX, 3, 4);
    t[0x79] = op_pg(Op::Adc, Mode::AbsoluteY, 3, 4);
    t[0x61] = op(Op::Adc, Mode::IndirectX, 2, 6);
    t[0x71] = op_pg(Op::Adc, Mode::IndirectY, 2, 5);

    t[0x29] = op(Op::And, Mode::Immediate, 2, 2);
    t[0x25] = op(Op::And, Mode::ZeroPage, 2, 3);
    t[0x35] = op(Op::And, Mode::ZeroPageX, 2, 4);
    t[0x2D] = op(Op::And, Mode::Absolute, 3, 4);
    t[0x3D] = op_pg(Op::And, Mode::AbsoluteX, 3, 4);
    t[0x39] = op_pg(Op::And, Mode::AbsoluteY, 3, 4);
    t[0x21] = op(Op::And, Mode::IndirectX, 2, 6);
    t[0x31] = op_pg(Op::And, Mode::IndirectY, 2, 5);

    t[0x0A] = op(Op::Asl, Mode::Accumulator, 1, 2);
    t[0x06] = op(Op::Asl, Mode::ZeroPage, 2, 5);
    t[0x16] = op(Op::Asl, Mode::ZeroPageX, 2, 6);
    t[0x0E] = op(Op::Asl, Mode::Absolute, 3, 6);
    t[0x1E] = op(Op::Asl, Mode::AbsoluteX, 3, 7);

    t[0x90] = op(Op::Bcc, Mode::Relative, 2, 2);
    t[0xB0] = op(Op::Bcs, Mode::Relative, 2, 2);
    t[0xF0] = op(Op::Beq, Mode::Relative, 2, 2);

    t[0x24] = op(Op::Bit, Mode::ZeroPage, 2, 3);
    t[0x2C] = op(Op::Bit, Mode::Absolute, 3, 4);

    t[0x30] = op(Op::Bmi, Mode::Relative, 2, 2);
    t[0xD0] = op(Op::Bne, Mode::Relative, 2, 2);
    t[0x10] = op(Op::Bpl, Mode::Relative, 2, 2);

    t[0x00] = op(Op::Brk, Mode::Implied, 1, 7);

    t[0x50] = op(Op::Bvc, Mode::Relative, 2, 2);
    t[0x70] = op(Op::Bvs, Mode::Relative, 2, 2);

    t[0x18] = op(Op::Clc, Mode::Implied, 1, 2);
    t[0xD8] = op(Op::Cld, Mode::Implied, 1, 2);
    t[0x58] = op(Op::Cli, Mode::Implied, 1, 2);
    t[0xB8] = op(Op::Clv, Mode::Implied, 1, 2);

    t[0xC9] = op(Op::Cmp, Mode::Immediate, 2, 2);
    t[0xC5] = op(Op::Cmp, Mode::ZeroPage, 2, 3);
    t[0xD5] = op(Op::Cmp, Mode::ZeroPageX, 2, 4);
    t[0xCD] = op(Op::Cmp, Mode::Absolute, 3, 4);
    t[0xDD] = op_pg(Op::Cmp, Mode::AbsoluteX, 3, 4);
    t[0xD9] = op_pg(Op::Cmp, Mode::AbsoluteY, 3, 4);
    t[0xC1] = op(Op::Cmp, Mode::IndirectX, 2, 6);
    t[0xD1] = op_pg(Op::Cmp, Mode::IndirectY, 2, 5);

    t[0xE0] = op(Op::Cpx, Mode::Immediate, 2, 2);
    t[0xE4] = op(Op::Cpx, Mode::ZeroPage, 2, 3);
    t[0xEC] = op(Op::Cpx, Mode::Absolute, 3, 4);

    t[0xC0] = op(Op::Cpy, Mode::Immediate, 2, 2);
    t[0xC4] = op(Op::Cpy, Mode::ZeroPage, 2, 3);
    t[0xCC] = op(Op::Cpy, Mode::Absolute, 3, 4);

    t[0xC6] = op(Op::Dec, Mode::ZeroPage, 2, 5);
    t[0xD6] = op(Op::Dec, Mode::ZeroPageX, 2, 6);
    t[0xCE] = op(Op::Dec, Mode::Absolute, 3, 6);
    t[0xDE] = op(Op::Dec, Mode::AbsoluteX, 3, 7);

    t[0xCA] = op(Op::Dex, Mode::Implied, 1, 2);
    t[0x88] = op(Op::Dey, Mode::Implied, 1, 2);

    t[0x49] = op(Op::Eor, Mode::Immediate, 2, 2);
    t[0x45] = op(Op::Eor, Mode::ZeroPage, 2, 3);
    t[0x55] = op(Op::Eor, Mode::ZeroPageX, 2, 4);
    t[0x4D] = op(Op::Eor, Mode::Absolute, 3, 4);
    t[0x5D] = op_pg(Op::Eor, Mode::AbsoluteX, 3, 4);
    t[0x59] = op_pg(Op::Eor, Mode::AbsoluteY, 3, 4);
    t[0x41] = op(Op::Eor, Mode::IndirectX, 2, 6);
    t[0x51] = op_pg(Op::Eor, Mode::IndirectY, 2, 5);

    t[0xE6] = op(Op::Inc, Mode::ZeroPage, 2, 5);
    t[0xF6] = op(Op::Inc, Mode::ZeroPageX, 2, 6);
    t[0xEE] = op(Op::Inc, Mode::Absolute, 3, 6);
    t[0xFE] = op(Op::Inc, Mode::AbsoluteX, 3, 7);

    t[0xE8] = op(Op::Inx, Mode::Implied, 1, 2);
    t[0xC8] = op(Op::Iny, Mode::Implied, 1, 2);

    t[0x4C] = op(Op::Jmp, Mode::Absolute, 3, 3);
    t[0x6C] = op(Op::Jmp, Mode::Indirect, 3, 5);

    t[0x20] = op(Op::Jsr, Mode::Absolute, 3, 6);

    t[0xA9] = op(Op::Lda, Mode::Immediate, 2, 2);
    t[0xA5] = op(Op::Lda, Mode::ZeroPage, 2, 3);
    t[0xB5] = op(Op::Lda, Mode::ZeroPageX, 2, 4);
    t[0xAD] = op(Op::Lda, Mode::Absolute, 3, 4);
    t[0xBD] = op_pg(Op::Lda, Mode::AbsoluteX, 3, 4);
    t[0xB9] = op_pg(Op::Lda, Mode::AbsoluteY, 3, 4);
    t[0xA1] = op(Op::Lda, Mode::IndirectX, 2, 6);
    t[0xB1] = op_pg(Op::Lda, Mode::IndirectY, 2, 5);

    t[0xA2] = op(Op::Ldx, Mode::Immediate, 2, 2);
    t[0xA6] = op(Op::Ldx, Mode::ZeroPage, 2, 3);
    t[0xB6] = op(Op::Ldx, Mode::ZeroPageY, 2, 4);
    t[0xAE] = op(Op::Ldx, Mode::Absolute, 3, 4);
    t[0xBE] = op_pg(Op::Ldx, Mode::AbsoluteY, 3, 4);

    t[0xA0] = op(Op::Ldy, Mode::Immediate, 2, 2);
    t[0xA4] = op(Op::Ldy, Mode::ZeroPage, 2, 3);
    t[0xB4] = op(Op::Ldy, Mode::ZeroPageX, 2, 4);
    t[0xAC] = op(Op::Ldy, Mode::Absolute, 3, 4);
    t[0xBC] = op_pg(Op::Ldy, Mode::AbsoluteX, 3, 4);

    t[0x4A] = op(Op::Lsr, Mode::Accumulator, 1, 2);
    t[0x46] = op(Op::Lsr, Mode::ZeroPage, 2, 5);
    t[0x56] = op(Op::Lsr, Mode::ZeroPageX, 2, 6);
    t[0x4E] = op(Op::Lsr, Mode::Absolute, 3, 6);
    t[0x5E] = op(Op::Lsr, Mode::AbsoluteX, 3, 7);

    t[0xEA] = op(Op::Nop, Mode::Implied, 1, 2);

    t[0x09] = op(Op::Ora, Mode::Immediate, 2, 2);
    t[0x05] = op(Op::Ora, Mode::ZeroPage, 2, 3);
    t[0x15] = op(Op::Ora, Mode::ZeroPageX, 2, 4);
    t[0x0D] = op(Op::Ora, Mode::Absolute, 3, 4);
    t[0x1D] = op_pg(Op::Ora, Mode::AbsoluteX, 3, 4);
    t[0x19] = op_pg(Op::Ora, Mode::AbsoluteY, 3, 4);
    t[0x01] = op(Op::Ora, Mode::IndirectX, 2, 6);
    t[0x11] = op_pg(Op::Ora, Mode::IndirectY, 2, 5);

    t[0x48] = op(Op::Pha, Mode::Implied, 1, 3);
    t[0x08] = op(Op::Php, Mode::Implied, 1, 3);
    t[0x68] = op(Op::Pla, Mode::Implied, 1, 4);
    t[0x28] = op(Op::Plp, Mode::Implied, 1, 4);

    t[0x2A] = op(Op::Rol, Mode::Accumulator, 1, 2);
    t[0x26] = op(Op::Rol, Mode::ZeroPage, 2, 5);
    t[0x36] = op(Op::Rol, Mode::ZeroPageX, 2, 6);
    t[0x2E] = op(Op::Rol, Mode::Absolute, 3, 6);
    t[0x3E] = op(Op::Rol, Mode::AbsoluteX, 3, 7);

    t[0x6A] = op(Op::Ror, Mode::Accumulator, 1, 2);
    t[0x66] = op(Op::Ror, Mode::ZeroPage, 2, 5);
    t[0x76] = op(Op::Ror, Mode::ZeroPageX, 2, 6);
    t[0x6E] = op(Op::Ror, Mode::Absolute, 3, 6);
    t[0x7E] = op(Op::Ror, Mode::AbsoluteX, 3, 7);

    t[0x40] = op(Op::Rti, Mode::Implied, 1, 6);
    t[0x60] = op(Op::Rts, Mode::Implied, 1, 6);

    t[0xE9] = op(Op::Sbc, Mode::Immediate, 2, 2);
    t[0xE5] = op(Op::Sbc, Mode::ZeroPage, 2, 3);
    t[0xF5] = op(Op::Sbc, Mode::ZeroPageX, 2, 4);
    t[0xED] = op(Op::Sbc, Mode::Absolute, 3, 4);
    t[0xFD] = op_pg(Op::Sbc, Mode::AbsoluteX, 3, 4);
    t[0xF9] = op_pg(Op::Sbc, Mode::AbsoluteY, 3, 4);
    t[0xE1] = op(Op::Sbc, Mode::IndirectX, 2, 6);
    t[0xF1] = op_pg(Op::Sbc, Mode::IndirectY, 2, 5);

    t[0x38] = op(Op::Sec, Mode::Implied, 1, 2);
    t[0xF8] = op(Op::Sed, Mode::Implied, 1, 2);
    t[0x78] = op(Op::Sei, Mode::Implied, 1, 2);

    t[0x85] = op(Op::Sta, Mode::ZeroPage, 2, 3);
    t[0x95] = op(Op::Sta, Mode::ZeroPageX, 2, 4);
    t[0x8D] = op(Op::Sta, Mode::Absolute, 3, 4);
    t[0x9D] = op(Op::Sta, Mode::AbsoluteX, 3, 5);
    t[0x99] = op(Op::Sta, Mode::AbsoluteY, 3, 5);
    t[0x81] = op(Op::Sta, Mode::IndirectX, 2, 6);
    t[0x91] = op(Op::Sta, Mode::IndirectY, 2, 6);

    t[0x86] = op(Op::Stx, Mode::ZeroPage, 2, 3);
    t[0x96] = op(Op::Stx, Mode::ZeroPageY, 2, 4);
    t[0x8E] = op(Op::Stx, Mode::Absolute, 3, 4);

    t[0x84] = op(Op::Sty, Mode::ZeroPage, 2, 3);
    t[0x94] = op(Op::Sty, Mode::ZeroPageX, 2, 4);
    t[0x8C] = op(Op::Sty, Mode::Absolute, 3, 4);

    t[0xAA] = op(Op::Tax, Mode::Implied, 1, 2);
    t[0xA8] = op(Op::Tay, Mode::Implied, 1, 2);
    t[0xBA] = op(Op::Tsx, Mode::Implied, 1, 2);
    t[0x8A] = op(Op::Txa, Mode::Implied, 1, 2);
    t[0x9A] = op(Op::Txs, Mode::Implied, 1, 2);
    t[0x98] = op(Op::Tya, Mode::Implied, 1, 2);

    t
}

#[derive(Debug, Clone, Copy)]
enum Operand {
    None,
    Accumulator,
    Immediate(u8),
    Address(u16),
}

pub struct Cpu {
    a: u8,
    x: u8,
    y: u8,
    sp: u8,
    pc: u16,
    p: u8,

    total_cycles: u64,

    nmi_pending: bool,
    irq_pending: bool,

    dma_cycles: u32,
    dma_page: u8,
    dma_offset: u8,
    dma_latch: u8,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD,
            pc: 0,
            p: FLAG_INTERRUPT | FLAG_UNUSED,
            total_cycles: 0,
            nmi_pending: false,
            irq_pending: false,
            dma_cycles: 0,
            dma_page: 0,
            dma_offset: 0,
            dma_latch: 0,
        }
    }

    pub fn reset(&mut self, bus: &mut impl CpuBus) {
        self.pc = self.read_word(bus, RESET_VECTOR);
        self.sp = self.sp.wrapping_sub(3);
        self.set_flag(FLAG_INTERRUPT, true);
        self.total_cycles = 0;
        self.nmi_pending = false;
        self.irq_pending = false;
        self.dma_cycles = 0;
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    pub fn dma_active(&self) -> bool {
        self.dma_cycles > 0
    }

    pub fn raise_nmi(&mut self) {
        self.nmi_pending = true;
    }

    pub fn raise_irq(&mut self) {
        self.irq_pending = true;
    }

    pub fn begin_dma(&mut self, page: u8) {
        self.dma_page = page;
        self.dma_offset = 0;
        // One extra alignment cycle when the transfer starts on an odd cycle.
        self.dma_cycles = DMA_TRANSFER_CYCLES + (self.total_cycles % 2) as u32;
    }

    /// Advances by one DMA cycle, one interrupt entry, or one instruction,
    /// in that priority order, and returns the cycles consumed.
    pub fn step(&mut self, bus: &mut impl CpuBus) -> u32 {
        if self.dma_cycles > 0 {
            return self.dma_cycle(bus);
        }

        if self.nmi_pending {
            self.nmi_pending = false;
            self.service_interrupt(bus, NMI_VECTOR);
            self.total_cycles += INTERRUPT_CYCLES as u64;
            return INTERRUPT_CYCLES;
        }

        if self.irq_pending && !self.flag(FLAG_INTERRUPT) {
            self.irq_pending = false;
            self.service_interrupt(bus, IRQ_BRK_VECTOR);
            self.total_cycles += INTERRUPT_CYCLES as u64;
            return INTERRUPT_CYCLES;
        }

        let opcode = bus.read(self.pc);
        let Some(entry) = OPCODE_TABLE[opcode as usize] else {
            // Undefined opcodes are absorbed as a 2-cycle skip.
            self.pc = self.pc.wrapping_add(1);
            self.total_cycles += 2;
            return 2;
        };

        let cycles = self.execute(bus, entry);
        self.total_cycles += cycles as u64;
        cycles
    }

    fn dma_cycle(&mut self, bus: &mut impl CpuBus) -> u32 {
        // Countdown values at or above DMA_TRANSFER_CYCLES are alignment
        // idles; below it, even values read and odd values write.
        if self.dma_cycles < DMA_TRANSFER_CYCLES {
            if self.dma_cycles % 2 == 0 {
                let addr = ((self.dma_page as u16) << 8) | self.dma_offset as u16;
                self.dma_latch = bus.read(addr);
            } else {
                bus.write(OAM_DATA_ADDRESS, self.dma_latch);
                self.dma_offset = self.dma_offset.wrapping_add(1);
            }
        }

        self.dma_cycles -= 1;
        self.total_cycles += 1;
        1
    }

    fn service_interrupt(&mut self, bus: &mut impl CpuBus, vector: u16) {
        self.push_word(bus, self.pc);
        // Hardware interrupt signature: bit 5 set, bit 4 clear.
        self.push(bus, (self.p | FLAG_UNUSED) & !FLAG_BREAK);
        self.set_flag(FLAG_INTERRUPT, true);
        self.pc = self.read_word(bus, vector);
    }

    fn execute(&mut self, bus: &mut impl CpuBus, entry: Opcode) -> u32 {
        let operand_pc = self.pc.wrapping_add(1);
        let (operand, crossed) = self.resolve_operand(bus, entry.mode, operand_pc);
        self.pc = self.pc.wrapping_add(entry.size as u16);

        let mut cycles = entry.cycles as u32;
        if entry.page_cycle && crossed {
            cycles += 1;
        }

        match entry.op {
            Op::Adc => {
                let value = self.operand_value(bus, operand);
                self.adc(value);
            }
            Op::And => {
                let value = self.operand_value(bus, operand);
                self.a &= value;
                self.update_zn(self.a);
            }
            Op::Asl => {
                let value = self.operand_value(bus, operand);
                let result = self.asl(value);
                self.write_operand(bus, operand, result);
            }
            Op::Bcc => cycles += self.branch(operand, !self.flag(FLAG_CARRY)),
            Op::Bcs => cycles += self.branch(operand, self.flag(FLAG_CARRY)),
            Op::Beq => cycles += self.branch(operand, self.flag(FLAG_ZERO)),
            Op::Bit => {
                let value = self.operand_value(bus, operand);
                self.set_flag(FLAG_ZERO, (self.a & value) == 0);
                self.set_flag(FLAG_OVERFLOW, (value & 0x40) != 0);
                self.set_flag(FLAG_NEGATIVE, (value & 0x80) != 0);
            }
            Op::Bmi => cycles += self.branch(operand, self.flag(FLAG_NEGATIVE)),
            Op::Bne => cycles += self.branch(operand, !self.flag(FLAG_ZERO)),
            Op::Bpl => cycles += self.branch(operand, !self.flag(FLAG_NEGATIVE)),
            Op::Brk => {
                // Software interrupt signature: bits 4 and 5 both set.
                self.push_word(bus, self.pc.wrapping_add(1));
                self.push(bus, self.p | FLAG_BREAK | FLAG_UNUSED);
                self.set_flag(FLAG_INTERRUPT, true);
                self.pc = self.read_word(bus, IRQ_BRK_VECTOR);
            }
            Op::Bvc => cycles += self.branch(operand, !self.flag(FLAG_OVERFLOW)),
            Op::Bvs => cycles += self.branch(operand, self.flag(FLAG_OVERFLOW)),
            Op::Clc => self.set_flag(FLAG_CARRY, false),
            Op::Cld => self.set_flag(FLAG_DECIMAL, false),
            Op::Cli => self.set_flag(FLAG_INTERRUPT, false),
            Op::Clv => self.set_flag(FLAG_OVERFLOW, false),
            Op::Cmp => {
                let value = self.operand_value(bus, operand);
                self.compare(self.a, value);
            }
            Op::Cpx => {
                let value = self.operand_value(bus, operand);
                self.compare(self.x, value);
            }
            Op::Cpy => {
                let value = self.operand_value(bus, operand);
                self.compare(self.y, value);
            }
            Op::Dec => {
                let value = self.operand_value(bus, operand).wrapping_sub(1);
                self.update_zn(value);
                self.write_operand(bus, operand, value);
            }
            Op::Dex => {
                self.x = self.x.wrapping_sub(1);
                self.update_zn(self.x);
            }
            Op::Dey => {
                self.y = self.y.wrapping_sub(1);
                self.update_zn(self.y);
            }
            Op::Eor => {
                let value = self.operand_value(bus, operand);
                self.a ^= value;
                self.update_zn(self.a);
            }
            Op::Inc => {
                let value = self.operand_value(bus, operand).wrapping_add(1);
                self.update_zn(value);
                self.write_operand(bus, operand, value);
            }
            Op::Inx => {
                self.x = self.x.wrapping_add(1);
                self.update_zn(self.x);
            }
            Op::Iny => {
                self.y = self.y.wrapping_add(1);
                self.update_zn(self.y);
            }
            Op::Jmp => {
                if let Operand::Address(addr) = operand {
                    self.pc = addr;
                }
            }
            Op::Jsr => {
                if let Operand::Address(addr) = operand {
                    self.push_word(bus, self.pc.wrapping_sub(1));
                    self.pc = addr;
                }
            }
            Op::Lda => {
                self.a = self.operand_value(bus, operand);
                self.update_zn(self.a);
            }
            Op::Ldx => {
                self.x = self.operand_value(bus, operand);
                self.update_zn(self.x);
            }
            Op::Ldy => {
                self.y = self.operand_value(bus, operand);
                self.update_zn(self.y);
            }
            Op::Lsr => {
                let value = self.operand_value(bus, operand);
                let result = self.lsr(value);
                self.write_operand(bus, operand, result);
            }
            Op::Nop => {}
            Op::Ora => {
                let value = self.operand_value(bus, operand);
                self.a |= value;
                self.update_zn(self.a);
            }
            Op::Pha => self.push(bus, self.a),
            Op::Php => self.push(bus, self.p | FLAG_BREAK | FLAG_UNUSED),
            Op::Pla => {
                self.a = self.pop(bus);
                self.update_zn(self.a);
            }
            Op::Plp => {
                self.p = self.pop(bus);
                self.p &= !FLAG_BREAK;
                self.p |= FLAG_UNUSED;
            }
            Op::Rol => {
                let value = self.operand_value(bus, operand);
                let result = self.rol(value);
                self.write_operand(bus, operand, result);
            }
            Op::Ror => {
                let value = self.operand_value(bus, operand);
                let result = self.ror(value);
                self.write_operand(bus, operand, result);
            }
            Op::Rti => {
                self.p = self.pop(bus);
                self.p &= !FLAG_BREAK;
                self.p |= FLAG_UNUSED;
                self.pc = self.pop_word(bus);
            }
            Op::Rts => {
                self.pc = self.pop_word(bus).wrapping_add(1);
            }
            Op::Sbc => {
                let value = self.operand_value(bus, operand);
                self.adc(value ^ 0xFF);
            }
            Op::Sec => self.set_flag(FLAG_CARRY, true),
            Op::Sed => self.set_flag(FLAG_DECIMAL, true),
            Op::Sei => self.set_flag(FLAG_INTERRUPT, true),
            Op::Sta => self.write_operand(bus, operand, self.a),
            Op::Stx => self.write_operand(bus, operand, self.x),
            Op::Sty => self.write_operand(bus, operand, self.y),
            Op::Tax => {
                self.x = self.a;
                self.update_zn(self.x);
            }
            Op::Tay => {
                self.y = self.a;
                self.update_zn(self.y);
            }
            Op::Tsx => {
                self.x = self.sp;
                self.update_zn(self.x);
            }
            Op::Txa => {
                self.a = self.x;
                self.update_zn(self.a);
            }
            Op::Txs => self.sp = self.x,
            Op::Tya => {
                self.a = self.y;
                self.update_zn(self.a);
            }
        }

        cycles
    }

    fn resolve_operand(
        &mut self,
        bus: &mut impl CpuBus,
        mode: Mode,
        operand_pc: u16,
    ) -> (Operand, bool) {
        match mode {
            Mode::Implied => (Operand::None, false),
            Mode::Accumulator => (Operand::Accumulator, false),
            Mode::Immediate | Mode::Relative => (Operand::Immediate(bus.read(operand_pc)), false),
            Mode::ZeroPage => (Operand::Address(bus.read(operand_pc) as u16), false),
            Mode::ZeroPageX => {
                let base = bus.read(operand_pc);
                (Operand::Address(base.wrapping_add(self.x) as u16), false)
            }
            Mode::ZeroPageY => {
                let base = bus.read(operand_pc);
                (Operand::Address(base.wrapping_add(self.y) as u16), false)
            }
            Mode::Absolute => (Operand::Address(self.read_word(bus, operand_pc)), false),
            Mode::AbsoluteX => {
                let base = self.read_word(bus, operand_pc);
                let addr = base.wrapping_add(self.x as u16);
                (Operand::Address(addr), Self::page_crossed(base, addr))
            }
            Mode::AbsoluteY => {
                let base = self.read_word(bus, operand_pc);
                let addr = base.wrapping_add(self.y as u16);
                (Operand::Address(addr), Self::page_crossed(base, addr))
            }
            Mode::Indirect => {
                let ptr = self.read_word(bus, operand_pc);
                (Operand::Address(self.read_word_page_bug(bus, ptr)), false)
            }
            Mode::IndirectX => {
                let zp = bus.read(operand_pc).wrapping_add(self.x);
                (Operand::Address(self.read_zero_page_word(bus, zp)), false)
            }
            Mode::IndirectY => {
                let zp = bus.read(operand_pc);
                let base = self.read_zero_page_word(bus, zp);
                let addr = base.wrapping_add(self.y as u16);
                (Operand::Address(addr), Self::page_crossed(base, addr))
            }
        }
    }

    fn operand_value(&mut self, bus: &mut impl CpuBus, operand: Operand) -> u8 {
        match operand {
            Operand::Accumulator => self.a,
            Operand::Immediate(value) => value,
            Operand::Address(addr) => bus.read(addr),
            Operand::None => 0,
        }
    }

    fn write_operand(&mut self, bus: &mut impl CpuBus, operand: Operand, value: u8) {
        match operand {
            Operand::Accumulator => self.a = value,
            Operand::Address(addr) => bus.write(addr, value),
            _ => {}
        }
    }

    fn branch(&mut self, operand: Operand, condition: bool) -> u32 {
        let Operand::Immediate(offset) = operand else {
            return 0;
        };

        if !condition {
            return 0;
        }

        let old_pc = self.pc;
        self.pc = old_pc.wrapping_add(offset as i8 as i16 as u16);
        if Self::page_crossed(old_pc, self.pc) { 2 } else { 1 }
    }

    fn adc(&mut self, value: u8) {
        let carry = self.flag(FLAG_CARRY) as u16;
        let sum = self.a as u16 + value as u16 + carry;
        let result = sum as u8;

        self.set_flag(FLAG_CARRY, sum > 0xFF);
        self.set_flag(
            FLAG_OVERFLOW,
            ((self.a ^ result) & (value ^ result) & 0x80) != 0,
        );

        self.a = result;
        self.update_zn(self.a);
    }

    fn compare(&mut self, register: u8, value: u8) {
        // Carry set means no borrow occurred.
        self.set_flag(FLAG_CARRY, register >= value);
        self.update_zn(register.wrapping_sub(value));
    }

    fn asl(&mut self, value: u8) -> u8 {
        self.set_flag(FLAG_CARRY, (value & 0x80) != 0);
        let result = value << 1;
        self.update_zn(result);
        result
    }

    fn lsr(&mut self, value: u8) -> u8 {
        self.set_flag(FLAG_CARRY, (value & 0x01) != 0);
        let result = value >> 1;
        self.update_zn(result);
        result
    }

    fn rol(&mut self, value: u8) -> u8 {
        let carry_in = self.flag(FLAG_CARRY) as u8;
        self.set_flag(FLAG_CARRY, (value & 0x80) != 0);
        let result = (value << 1) | carry_in;
        self.update_zn(result);
        result
    }

    fn ror(&mut self, value: u8) -> u8 {
        let carry_in = if self.flag(FLAG_CARRY) { 0x80 } else { 0 };
        self.set_flag(FLAG_CARRY, (value & 0x01) != 0);
        let result = (value >> 1) | carry_in;
        self.update_zn(result);
        result
    }

    fn page_crossed(a: u16, b: u16) -> bool {
        (a & 0xFF00) != (b & 0xFF00)
    }

    fn read_word(&mut self, bus: &mut impl CpuBus, addr: u16) -> u16 {
        let lo = bus.read(addr) as u16;
        let hi = bus.read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    // A pointer ending a page reads its high byte from the start of the same
    // page, not the next one.
    fn read_word_page_bug(&mut self, bus: &mut impl CpuBus, addr: u16) -> u16 {
        let lo = bus.read(addr) as u16;
        let hi_addr = (addr & 0xFF00) | (addr.wrapping_add(1) & 0x00FF);
        let hi = bus.read(hi_addr) as u16;
        (hi << 8) | lo
    }

    fn read_zero_page_word(&mut self, bus: &mut impl CpuBus, addr: u8) -> u16 {
        let lo = bus.read(addr as u16) as u16;
        let hi = bus.read(addr.wrapping_add(1) as u16) as u16;
        (hi << 8) | lo
    }

    fn push(&mut self, bus: &mut impl CpuBus, value: u8) {
        bus.write(STACK_BASE | self.sp as u16, value);
        self.sp = self.sp.wrapping_sub(1);
    }

    fn pop(&mut self, bus: &mut impl CpuBus) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        bus.read(STACK_BASE | self.sp as u16)
    }

    fn push_word(&mut self, bus: &mut impl CpuBus, value: u16) {
        self.push(bus, (value >> 8) as u8);
        self.push(bus, value as u8);
    }

    fn pop_word(&mut self, bus: &mut impl CpuBus) -> u16 {
        let lo = self.pop(bus) as u16;
        let hi = self.pop(bus) as u16;
        (hi << 8) | lo
    }

    pub(crate) fn flag(&self, flag: u8) -> bool {
        (self.p & flag) != 0
    }

    fn set_flag(&mut self, flag: u8, value: bool) {
        if value {
            self.p |= flag;
        } else {
            self.p &= !flag;
        }
        self.p |= FLAG_UNUSED;
    }

    fn update_zn(&mut self, value: u8) {
        self.set_flag(FLAG_ZERO, value == 0);
        self.set_flag(FLAG_NEGATIVE, (value & 0x80) != 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RamBus {
        mem: Vec<u8>,
        oam_writes: Vec<u8>,
    }

    impl RamBus {
        fn new() -> Self {
            Self {
                mem: vec![0; 0x10000],
                oam_writes: Vec::new(),
            }
        }
    }

    impl CpuBus for RamBus {
        fn read(&mut self, addr: u16) -> u8 {
            self.mem[addr as usize]
        }

        fn write(&mut self, addr: u16, value: u8) {
            if addr == OAM_DATA_ADDRESS {
                self.oam_writes.push(value);
            }
            self.mem[addr as usize] = value;
        }
    }

    fn bus_with_program(program: &[u8]) -> RamBus {
        let mut bus = RamBus::new();
        bus.mem[0x8000..0x8000 + program.len()].copy_from_slice(program);
        bus.mem[RESET_VECTOR as usize] = 0x00;
        bus.mem[RESET_VECTOR as usize + 1] = 0x80;
        bus
    }

    fn cpu_at_reset(bus: &mut RamBus) -> Cpu {
        let mut cpu = Cpu::new();
        cpu.reset(bus);
        cpu
    }

    #[test]
    fn adc_sets_overflow_and_negative() {
        let mut bus = bus_with_program(&[0xA9, 0x50, 0x69, 0x50]);
        let mut cpu = cpu_at_reset(&mut bus);

        cpu.step(&mut bus);
        cpu.step(&mut bus);

        assert_eq!(cpu.a, 0xA0);
        assert!(cpu.flag(FLAG_OVERFLOW));
        assert!(cpu.flag(FLAG_NEGATIVE));
        assert!(!cpu.flag(FLAG_CARRY));
        assert!(!cpu.flag(FLAG_ZERO));
    }

    #[test]
    fn adc_sets_carry_and_zero_on_wrap() {
        let mut bus = bus_with_program(&[0xA9, 0xFF, 0x69, 0x01]);
        let mut cpu = cpu_at_reset(&mut bus);

        cpu.step(&mut bus);
        cpu.step(&mut bus);

        assert_eq!(cpu.a, 0x00);
        assert!(cpu.flag(FLAG_CARRY));
        assert!(cpu.flag(FLAG_ZERO));
        assert!(!cpu.flag(FLAG_NEGATIVE));
        assert!(!cpu.flag(FLAG_OVERFLOW));
    }

    #[test]
    fn sbc_implements_borrow_through_carry() {
        // SEC; LDA #$10; SBC #$08 -> $08 with carry still set.
        let mut bus = bus_with_program(&[0x38, 0xA9, 0x10, 0xE9, 0x08]);
        let mut cpu = cpu_at_reset(&mut bus);

        cpu.step(&mut bus);
        cpu.step(&mut bus);
        cpu.step(&mut bus);

        assert_eq!(cpu.a, 0x08);
        assert!(cpu.flag(FLAG_CARRY));
    }

    #[test]
    fn compare_leaves_carry_when_no_borrow() {
        let mut bus = bus_with_program(&[0xA9, 0x40, 0xC9, 0x40, 0xC9, 0x41]);
        let mut cpu = cpu_at_reset(&mut bus);

        cpu.step(&mut bus);
        cpu.step(&mut bus);
        assert!(cpu.flag(FLAG_CARRY));
        assert!(cpu.flag(FLAG_ZERO));

        cpu.step(&mut bus);
        assert!(!cpu.flag(FLAG_CARRY));
        assert!(!cpu.flag(FLAG_ZERO));
    }

    #[test]
    fn absolute_x_read_pays_for_page_cross() {
        // LDX #$01; LDA $80FF,X crosses into $8100.
        let mut bus = bus_with_program(&[0xA2, 0x01, 0xBD, 0xFF, 0x80]);
        bus.mem[0x8100] = 0x5A;
        let mut cpu = cpu_at_reset(&mut bus);

        cpu.step(&mut bus);
        let cycles = cpu.step(&mut bus);

        assert_eq!(cpu.a, 0x5A);
        assert_eq!(cycles, 5);
    }

    #[test]
    fn absolute_x_read_without_cross_is_base_cycles() {
        let mut bus = bus_with_program(&[0xA2, 0x01, 0xBD, 0x00, 0x90]);
        bus.mem[0x9001] = 0xA5;
        let mut cpu = cpu_at_reset(&mut bus);

        cpu.step(&mut bus);
        let cycles = cpu.step(&mut bus);

        assert_eq!(cpu.a, 0xA5);
        assert_eq!(cycles, 4);
    }

    #[test]
    fn store_absolute_x_never_pays_page_cross() {
        let mut bus = bus_with_program(&[0xA9, 0x77, 0xA2, 0x01, 0x9D, 0xFF, 0x10]);
        let mut cpu = cpu_at_reset(&mut bus);

        cpu.step(&mut bus);
        cpu.step(&mut bus);
        let cycles = cpu.step(&mut bus);

        assert_eq!(cycles, 5);
        assert_eq!(bus.mem[0x1100], 0x77);
    }

    #[test]
    fn branch_not_taken_costs_base_cycles() {
        // Carry clear, BCS not taken.
        let mut bus = bus_with_program(&[0xB0, 0x10]);
        let mut cpu = cpu_at_reset(&mut bus);

        let cycles = cpu.step(&mut bus);

        assert_eq!(cycles, 2);
        assert_eq!(cpu.pc, 0x8002);
    }

    #[test]
    fn branch_taken_same_page_costs_one_extra() {
        let mut bus = bus_with_program(&[0x18, 0x90, 0x10]);
        let mut cpu = cpu_at_reset(&mut bus);

        cpu.step(&mut bus);
        let cycles = cpu.step(&mut bus);

        assert_eq!(cycles, 3);
        assert_eq!(cpu.pc, 0x8013);
    }

    #[test]
    fn branch_taken_across_page_costs_two_extra() {
        let mut bus = RamBus::new();
        // BCC -16 at $8005 lands on $7FF7, one page down.
        bus.mem[0x8005] = 0x90;
        bus.mem[0x8006] = 0xF0;
        bus.mem[RESET_VECTOR as usize] = 0x05;
        bus.mem[RESET_VECTOR as usize + 1] = 0x80;
        let mut cpu = cpu_at_reset(&mut bus);

        let cycles = cpu.step(&mut bus);

        assert_eq!(cycles, 4);
        assert_eq!(cpu.pc, 0x7FF7);
    }

    #[test]
    fn indirect_jmp_wraps_pointer_within_page() {
        let mut bus = bus_with_program(&[0x6C, 0xFF, 0x30]);
        bus.mem[0x30FF] = 0x34;
        bus.mem[0x3000] = 0x12;
        bus.mem[0x3100] = 0xEE; // must not be used
        let mut cpu = cpu_at_reset(&mut bus);

        cpu.step(&mut bus);

        assert_eq!(cpu.pc, 0x1234);
    }

    #[test]
    fn indexed_indirect_pointer_wraps_in_zero_page() {
        // LDX #$05; LDA ($FE,X) -> pointer bytes at $03/$04.
        let mut bus = bus_with_program(&[0xA2, 0x05, 0xA1, 0xFE]);
        bus.mem[0x0003] = 0x20;
        bus.mem[0x0004] = 0x40;
        bus.mem[0x4020] = 0x77;
        let mut cpu = cpu_at_reset(&mut bus);

        cpu.step(&mut bus);
        cpu.step(&mut bus);

        assert_eq!(cpu.a, 0x77);
    }

    #[test]
    fn zero_page_x_wraps_within_page() {
        // LDX #$10; STA $F8,X lands on $08, not $0108.
        let mut bus = bus_with_program(&[0xA9, 0x42, 0xA2, 0x10, 0x95, 0xF8]);
        let mut cpu = cpu_at_reset(&mut bus);

        cpu.step(&mut bus);
        cpu.step(&mut bus);
        cpu.step(&mut bus);

        assert_eq!(bus.mem[0x0008], 0x42);
        assert_eq!(bus.mem[0x0108], 0x00);
    }

    #[test]
    fn operand_write_then_read_round_trips() {
        // STA $10; LDA $10 through the same effective address.
        let mut bus = bus_with_program(&[0xA9, 0x99, 0x85, 0x10, 0xA9, 0x00, 0xA5, 0x10]);
        let mut cpu = cpu_at_reset(&mut bus);

        for _ in 0..4 {
            cpu.step(&mut bus);
        }

        assert_eq!(cpu.a, 0x99);
    }

    #[test]
    fn rmw_updates_memory_and_flags_from_result() {
        // ASL $10 where $10 holds $80: result 0, carry out, zero set.
        let mut bus = bus_with_program(&[0x06, 0x10]);
        bus.mem[0x0010] = 0x80;
        let mut cpu = cpu_at_reset(&mut bus);

        let cycles = cpu.step(&mut bus);

        assert_eq!(cycles, 5);
        assert_eq!(bus.mem[0x0010], 0x00);
        assert!(cpu.flag(FLAG_CARRY));
        assert!(cpu.flag(FLAG_ZERO));
    }

    #[test]
    fn rol_zero_flag_tracks_rotated_value() {
        // ROL $10 with $80 and carry clear rotates to 0.
        let mut bus = bus_with_program(&[0x18, 0x26, 0x10]);
        bus.mem[0x0010] = 0x80;
        let mut cpu = cpu_at_reset(&mut bus);
        cpu.a = 0x55; // must not influence the zero flag

        cpu.step(&mut bus);
        cpu.step(&mut bus);

        assert_eq!(bus.mem[0x0010], 0x00);
        assert!(cpu.flag(FLAG_ZERO));
        assert!(cpu.flag(FLAG_CARRY));
    }

    #[test]
    fn jsr_rts_round_trip() {
        let mut bus = bus_with_program(&[0x20, 0x10, 0x90]);
        bus.mem[0x9010] = 0x60; // RTS
        let mut cpu = cpu_at_reset(&mut bus);

        cpu.step(&mut bus);
        assert_eq!(cpu.pc, 0x9010);

        cpu.step(&mut bus);
        assert_eq!(cpu.pc, 0x8003);
    }

    #[test]
    fn nmi_entry_pushes_hardware_status_signature() {
        let mut bus = bus_with_program(&[0xEA]);
        bus.mem[NMI_VECTOR as usize] = 0x00;
        bus.mem[NMI_VECTOR as usize + 1] = 0x90;
        let mut cpu = cpu_at_reset(&mut bus);
        let sp_before = cpu.sp;

        cpu.raise_nmi();
        let cycles = cpu.step(&mut bus);

        assert_eq!(cycles, INTERRUPT_CYCLES);
        assert_eq!(cpu.pc, 0x9000);
        assert!(cpu.flag(FLAG_INTERRUPT));

        let pushed_status = bus.mem[STACK_BASE as usize + sp_before.wrapping_sub(2) as usize];
        assert_eq!(pushed_status & FLAG_BREAK, 0);
        assert_eq!(pushed_status & FLAG_UNUSED, FLAG_UNUSED);
    }

    #[test]
    fn irq_honored_only_with_interrupts_enabled() {
        let mut bus = bus_with_program(&[0x58, 0xEA, 0xEA]);
        bus.mem[IRQ_BRK_VECTOR as usize] = 0x00;
        bus.mem[IRQ_BRK_VECTOR as usize + 1] = 0xA0;
        let mut cpu = cpu_at_reset(&mut bus);

        cpu.raise_irq();
        cpu.step(&mut bus); // CLI; interrupt-disable was set by reset
        cpu.step(&mut bus); // IRQ now serviced

        assert_eq!(cpu.pc, 0xA000);
    }

    #[test]
    fn brk_pushes_software_status_signature() {
        let mut bus = bus_with_program(&[0x00]);
        bus.mem[IRQ_BRK_VECTOR as usize] = 0x00;
        bus.mem[IRQ_BRK_VECTOR as usize + 1] = 0xB0;
        let mut cpu = cpu_at_reset(&mut bus);
        let sp_before = cpu.sp;

        let cycles = cpu.step(&mut bus);

        assert_eq!(cycles, 7);
        assert_eq!(cpu.pc, 0xB000);

        let pushed_status = bus.mem[STACK_BASE as usize + sp_before.wrapping_sub(2) as usize];
        assert_eq!(pushed_status & FLAG_BREAK, FLAG_BREAK);
        assert_eq!(pushed_status & FLAG_UNUSED, FLAG_UNUSED);
    }

    #[test]
    fn dma_consumes_513_cycles_from_even_start() {
        let mut bus = bus_with_program(&[0xEA]);
        for i in 0..256usize {
            bus.mem[0x0300 + i] = i as u8;
        }
        let mut cpu = cpu_at_reset(&mut bus);
        let pc_before = cpu.pc;

        assert_eq!(cpu.total_cycles % 2, 0);
        cpu.begin_dma(0x03);

        let mut consumed = 0;
        while cpu.dma_active() {
            consumed += cpu.step(&mut bus);
        }

        assert_eq!(consumed, 513);
        assert_eq!(cpu.pc, pc_before);
        assert_eq!(bus.oam_writes.len(), 256);
        assert_eq!(bus.oam_writes[0], 0x00);
        assert_eq!(bus.oam_writes[255], 0xFF);
    }

    #[test]
    fn dma_adds_alignment_cycle_from_odd_start() {
        let mut bus = bus_with_program(&[0xEA, 0xA5, 0x00]);
        let mut cpu = cpu_at_reset(&mut bus);

        cpu.step(&mut bus); // NOP: 2 cycles
        cpu.step(&mut bus); // LDA zp: 3 cycles -> odd total
        assert_eq!(cpu.total_cycles % 2, 1);

        cpu.begin_dma(0x02);
        let mut consumed = 0;
        while cpu.dma_active() {
            consumed += cpu.step(&mut bus);
        }

        assert_eq!(consumed, 514);
        assert_eq!(bus.oam_writes.len(), 256);
    }
}
