use std::collections::HashMap;

use serde::Serialize;

use crate::types::{FloatKind, IntKind, RegClass, Type};

pub mod disasm;

// ── Opcodes (32-bit packed instructions) ─────────────────────────────
//
// ABC mode:   [OP:8 | A:8 | B:8 | C:8]
// ABx mode:   [OP:8 | A:8 | Bx:16]   Bx unsigned
// AsBx mode:  [OP:8 | A:8 | sBx:16]  sBx signed (jumps, immediates)
//
// Comparisons skip the next instruction when the comparison result differs
// from the check bit in A. The `_R` form of every load/store is the base
// opcode plus one.

macro_rules! opcodes {
    ($($name:ident = $val:literal => $text:literal,)*) => {
        $(#[allow(dead_code)]
        pub(crate) const $name: u8 = $val;)*

        /// Mnemonic for an opcode byte.
        pub fn op_name(op: u8) -> Option<&'static str> {
            match op {
                $($val => Some($text),)*
                _ => None,
            }
        }
    };
}

opcodes! {
    OP_NOP = 0 => "nop",
    OP_JMP = 1 => "jmp",
    OP_IJMP = 2 => "ijmp",
    OP_TEST = 3 => "test",
    OP_RET = 4 => "ret",
    OP_RETI = 5 => "reti",
    OP_LI = 6 => "li",
    OP_LK = 7 => "lk",
    OP_LKF = 8 => "lkf",
    OP_LKS = 9 => "lks",
    OP_LKP = 10 => "lkp",
    OP_LB = 11 => "lb",
    OP_LB_R = 12 => "lb_r",
    OP_LH = 13 => "lh",
    OP_LH_R = 14 => "lh_r",
    OP_LW = 15 => "lw",
    OP_LW_R = 16 => "lw_r",
    OP_LBU = 17 => "lbu",
    OP_LBU_R = 18 => "lbu_r",
    OP_LHU = 19 => "lhu",
    OP_LHU_R = 20 => "lhu_r",
    OP_LSP = 21 => "lsp",
    OP_LSP_R = 22 => "lsp_r",
    OP_LDP = 23 => "ldp",
    OP_LDP_R = 24 => "ldp_r",
    OP_LS = 25 => "ls",
    OP_LS_R = 26 => "ls_r",
    OP_LP = 27 => "lp",
    OP_LP_R = 28 => "lp_r",
    OP_SB = 29 => "sb",
    OP_SB_R = 30 => "sb_r",
    OP_SH = 31 => "sh",
    OP_SH_R = 32 => "sh_r",
    OP_SW = 33 => "sw",
    OP_SW_R = 34 => "sw_r",
    OP_SSP = 35 => "ssp",
    OP_SSP_R = 36 => "ssp_r",
    OP_SDP = 37 => "sdp",
    OP_SDP_R = 38 => "sdp_r",
    OP_SS = 39 => "ss",
    OP_SS_R = 40 => "ss_r",
    OP_SP = 41 => "sp",
    OP_SP_R = 42 => "sp_r",
    OP_MOVE = 43 => "move",
    OP_MOVEF = 44 => "movef",
    OP_MOVES = 45 => "moves",
    OP_MOVEA = 46 => "movea",
    OP_CAST = 47 => "cast",
    OP_PARAM = 48 => "param",
    OP_PARAMI = 49 => "parami",
    OP_CALL = 50 => "call",
    OP_CALL_K = 51 => "call_k",
    OP_TAIL = 52 => "tail",
    OP_TAIL_K = 53 => "tail_k",
    OP_RESULT = 54 => "result",
    OP_BOUND = 55 => "bound",
    OP_SLL_RR = 56 => "sll_rr",
    OP_SLL_RI = 57 => "sll_ri",
    OP_SLL_KR = 58 => "sll_kr",
    OP_SRL_RR = 59 => "srl_rr",
    OP_SRL_RI = 60 => "srl_ri",
    OP_SRL_KR = 61 => "srl_kr",
    OP_SRA_RR = 62 => "sra_rr",
    OP_SRA_RI = 63 => "sra_ri",
    OP_SRA_KR = 64 => "sra_kr",
    OP_ADD_RR = 65 => "add_rr",
    OP_ADD_RK = 66 => "add_rk",
    OP_SUB_RR = 67 => "sub_rr",
    OP_SUB_RK = 68 => "sub_rk",
    OP_SUB_KR = 69 => "sub_kr",
    OP_MUL_RR = 70 => "mul_rr",
    OP_MUL_RK = 71 => "mul_rk",
    OP_DIV_RR = 72 => "div_rr",
    OP_DIV_RK = 73 => "div_rk",
    OP_DIV_KR = 74 => "div_kr",
    OP_DIVU_RR = 75 => "divu_rr",
    OP_DIVU_RK = 76 => "divu_rk",
    OP_DIVU_KR = 77 => "divu_kr",
    OP_MOD_RR = 78 => "mod_rr",
    OP_MOD_RK = 79 => "mod_rk",
    OP_MOD_KR = 80 => "mod_kr",
    OP_MODU_RR = 81 => "modu_rr",
    OP_MODU_RK = 82 => "modu_rk",
    OP_MODU_KR = 83 => "modu_kr",
    OP_AND_RR = 84 => "and_rr",
    OP_AND_RK = 85 => "and_rk",
    OP_OR_RR = 86 => "or_rr",
    OP_OR_RK = 87 => "or_rk",
    OP_XOR_RR = 88 => "xor_rr",
    OP_XOR_RK = 89 => "xor_rk",
    OP_MIN_RR = 90 => "min_rr",
    OP_MIN_RK = 91 => "min_rk",
    OP_MAX_RR = 92 => "max_rr",
    OP_MAX_RK = 93 => "max_rk",
    OP_ABS = 94 => "abs",
    OP_NEG = 95 => "neg",
    OP_NOT = 96 => "not",
    OP_EQ_R = 97 => "eq_r",
    OP_EQ_K = 98 => "eq_k",
    OP_LT_RR = 99 => "lt_rr",
    OP_LT_RK = 100 => "lt_rk",
    OP_LT_KR = 101 => "lt_kr",
    OP_LE_RR = 102 => "le_rr",
    OP_LE_RK = 103 => "le_rk",
    OP_LE_KR = 104 => "le_kr",
    OP_LTU_RR = 105 => "ltu_rr",
    OP_LTU_RK = 106 => "ltu_rk",
    OP_LTU_KR = 107 => "ltu_kr",
    OP_LEU_RR = 108 => "leu_rr",
    OP_LEU_RK = 109 => "leu_rk",
    OP_LEU_KR = 110 => "leu_kr",
    OP_ADDF_RR = 111 => "addf_rr",
    OP_ADDF_RK = 112 => "addf_rk",
    OP_SUBF_RR = 113 => "subf_rr",
    OP_SUBF_RK = 114 => "subf_rk",
    OP_SUBF_KR = 115 => "subf_kr",
    OP_MULF_RR = 116 => "mulf_rr",
    OP_MULF_RK = 117 => "mulf_rk",
    OP_DIVF_RR = 118 => "divf_rr",
    OP_DIVF_RK = 119 => "divf_rk",
    OP_DIVF_KR = 120 => "divf_kr",
    OP_MODF_RR = 121 => "modf_rr",
    OP_MODF_RK = 122 => "modf_rk",
    OP_MODF_KR = 123 => "modf_kr",
    OP_POWF_RR = 124 => "powf_rr",
    OP_POWF_RK = 125 => "powf_rk",
    OP_POWF_KR = 126 => "powf_kr",
    OP_MINF_RR = 127 => "minf_rr",
    OP_MINF_RK = 128 => "minf_rk",
    OP_MAXF_RR = 129 => "maxf_rr",
    OP_MAXF_RK = 130 => "maxf_rk",
    OP_FLOP = 131 => "flop",
    OP_EQF_R = 132 => "eqf_r",
    OP_EQF_K = 133 => "eqf_k",
    OP_LTF_RR = 134 => "ltf_rr",
    OP_LTF_RK = 135 => "ltf_rk",
    OP_LTF_KR = 136 => "ltf_kr",
    OP_LEF_RR = 137 => "lef_rr",
    OP_LEF_RK = 138 => "lef_rk",
    OP_LEF_KR = 139 => "lef_kr",
    OP_EQA_R = 140 => "eqa_r",
    OP_EQA_K = 141 => "eqa_k",
    OP_ADDA_RR = 142 => "adda_rr",
    OP_ADDA_RK = 143 => "adda_rk",
    OP_ATAN2 = 144 => "atan2",
}

// Comparison check bits (A operand).
pub(crate) const CMP_CHECK: u16 = 1;
pub(crate) const CMP_APPROX: u16 = 2;

// FLOP selectors beyond the library functions (C operand).
pub(crate) const FLOP_ABS: u16 = 16;
pub(crate) const FLOP_NEG: u16 = 17;

// RET flags (A operand).
pub(crate) const RET_FINAL: u16 = 0x80;

// CAST kinds (C operand).
pub(crate) const CAST_I2F: u16 = 1;
pub(crate) const CAST_U2F: u16 = 2;
pub(crate) const CAST_F2I: u16 = 3;
pub(crate) const CAST_F2U: u16 = 4;
pub(crate) const CAST_S2N: u16 = 5;
pub(crate) const CAST_N2S: u16 = 6;
pub(crate) const CAST_SO2S: u16 = 7;
pub(crate) const CAST_S2SO: u16 = 8;
pub(crate) const CAST_S2CO: u16 = 9;

/// Tag byte used by PARAM, RESULT and RET to describe an operand.
pub(crate) const REGT_KONST: u8 = 4;
pub(crate) const REGT_NIL: u8 = 8;

// ── Instruction encoding ─────────────────────────────────────────────

#[inline(always)]
pub(crate) fn encode_abc(op: u8, a: u8, b: u8, c: u8) -> u32 {
    (op as u32) << 24 | (a as u32) << 16 | (b as u32) << 8 | c as u32
}

#[inline(always)]
pub(crate) fn encode_abx(op: u8, a: u8, bx: u16) -> u32 {
    (op as u32) << 24 | (a as u32) << 16 | bx as u32
}

#[inline(always)]
pub(crate) fn decode(inst: u32) -> (u8, u8, u8, u8) {
    ((inst >> 24) as u8, (inst >> 16) as u8, (inst >> 8) as u8, inst as u8)
}

#[inline(always)]
pub(crate) fn decode_bx(inst: u32) -> u16 {
    inst as u16
}

#[inline(always)]
pub(crate) fn decode_sbx(inst: u32) -> i16 {
    inst as u16 as i16
}

// ── Typed memory access ──────────────────────────────────────────────

/// Load opcode (constant-offset form) for a value of `ty` in memory.
pub(crate) fn load_op(ty: &Type) -> u8 {
    match ty {
        Type::Int(IntKind::I8) => OP_LB,
        Type::Bool | Type::Int(IntKind::U8) => OP_LBU,
        Type::Int(IntKind::I16) => OP_LH,
        Type::Int(IntKind::U16) => OP_LHU,
        Type::Float(FloatKind::F32) => OP_LSP,
        Type::Float(FloatKind::F64) => OP_LDP,
        Type::String => OP_LS,
        t if t.is_pointer() => OP_LP,
        _ => OP_LW,
    }
}

pub(crate) fn store_op(ty: &Type) -> u8 {
    match ty {
        Type::Bool | Type::Int(IntKind::I8 | IntKind::U8) => OP_SB,
        Type::Int(IntKind::I16 | IntKind::U16) => OP_SH,
        Type::Float(FloatKind::F32) => OP_SSP,
        Type::Float(FloatKind::F64) => OP_SDP,
        Type::String => OP_SS,
        t if t.is_pointer() => OP_SP,
        _ => OP_SW,
    }
}

/// Register-offset form of a load or store.
pub(crate) fn indexed(op: u8) -> u8 {
    op + 1
}

pub(crate) fn move_op(class: RegClass) -> u8 {
    match class {
        RegClass::Float => OP_MOVEF,
        RegClass::String => OP_MOVES,
        RegClass::Pointer => OP_MOVEA,
        RegClass::Int | RegClass::Nil => OP_MOVE,
    }
}

pub(crate) fn load_const_op(class: RegClass) -> u8 {
    match class {
        RegClass::Float => OP_LKF,
        RegClass::String => OP_LKS,
        RegClass::Pointer => OP_LKP,
        RegClass::Int | RegClass::Nil => OP_LK,
    }
}

// ── Constants ────────────────────────────────────────────────────────

/// Runtime helpers reachable through `call_k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NativeFn {
    Random,
    FRandom,
    Random2,
    NameToClass,
    CallLineSpecial,
    HandleRuntimeState,
    FindSingleNameState,
    FindMultiNameState,
}

impl NativeFn {
    pub fn name(self) -> &'static str {
        match self {
            NativeFn::Random => "BuiltinRandom",
            NativeFn::FRandom => "BuiltinFRandom",
            NativeFn::Random2 => "BuiltinRandom2",
            NativeFn::NameToClass => "BuiltinNameToClass",
            NativeFn::CallLineSpecial => "BuiltinCallLineSpecial",
            NativeFn::HandleRuntimeState => "BuiltinHandleRuntimeState",
            NativeFn::FindSingleNameState => "BuiltinFindSingleNameState",
            NativeFn::FindMultiNameState => "BuiltinFindMultiNameState",
        }
    }
}

/// Entry in the address constant pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AddrConst {
    Null,
    State { id: u32, label: String },
    Class { name: String },
    Native { function: NativeFn },
    Function { name: String },
    Rng { name: String },
}

// ── Chunk ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct Chunk {
    pub name: String,
    pub code: Vec<u32>,
    pub int_consts: Vec<i32>,
    pub float_consts: Vec<f64>,
    pub string_consts: Vec<String>,
    pub addr_consts: Vec<AddrConst>,
    /// Name literals referenced by index from the integer pool.
    pub names: Vec<String>,
    /// Registers used per class: int, float, string, pointer.
    pub num_regs: [u16; 4],
    pub returns: Vec<String>,
}

// ── Register pools ───────────────────────────────────────────────────

const MAX_REGS: u16 = 256;

#[derive(Debug, Clone, Default)]
struct RegPool {
    used: [u64; 4],
    high_water: u16,
}

impl RegPool {
    fn is_used(&self, r: u16) -> bool {
        self.used[(r / 64) as usize] >> (r % 64) & 1 != 0
    }

    fn set(&mut self, r: u16, on: bool) {
        let word = &mut self.used[(r / 64) as usize];
        if on {
            *word |= 1 << (r % 64);
        } else {
            *word &= !(1 << (r % 64));
        }
    }

    /// Lowest run of `count` free registers.
    fn get(&mut self, count: u16) -> Option<u16> {
        let mut start = 0;
        'search: while start + count <= MAX_REGS {
            for r in start..start + count {
                if self.is_used(r) {
                    start = r + 1;
                    continue 'search;
                }
            }
            for r in start..start + count {
                self.set(r, true);
            }
            self.high_water = self.high_water.max(start + count);
            return Some(start);
        }
        None
    }

    fn release(&mut self, reg: u16, count: u16) -> bool {
        let mut ok = true;
        for r in reg..(reg + count).min(MAX_REGS) {
            ok &= self.is_used(r);
            self.set(r, false);
        }
        ok
    }

    fn reuse(&mut self, reg: u16) -> bool {
        if reg >= MAX_REGS || self.is_used(reg) {
            return false;
        }
        self.set(reg, true);
        self.high_water = self.high_water.max(reg + 1);
        true
    }

    fn live(&self) -> u32 {
        self.used.iter().map(|w| w.count_ones()).sum()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EmitError {
    #[error("function needs more than 256 {0:?} registers")]
    RegisterOverflow(RegClass),
    #[error("operand {value} does not fit instruction '{op}'")]
    OperandOverflow { op: &'static str, value: i64 },
    #[error("jump from {from} to {to} is out of range")]
    JumpOutOfRange { from: usize, to: usize },
    #[error("register {prefix}{reg} released while not in use", prefix = .class.prefix())]
    DoubleFree { class: RegClass, reg: u16 },
    #[error("register {prefix}{reg} reused while still live", prefix = .class.prefix())]
    BadReuse { class: RegClass, reg: u16 },
    #[error("cannot emit unresolved {0} node")]
    Unresolved(&'static str),
}

// ── Function builder ─────────────────────────────────────────────────

/// Instruction sink for one function: register pools, typed constant pools
/// and jump backpatching. Protocol violations are recorded and reported by
/// [`finish`](Self::finish) rather than aborting the walk.
pub struct FunctionBuilder {
    chunk: Chunk,
    pools: [RegPool; 4],
    int_index: HashMap<i32, u16>,
    float_index: HashMap<u64, u16>,
    string_index: HashMap<String, u16>,
    addr_index: HashMap<AddrConst, u16>,
    errors: Vec<EmitError>,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        FunctionBuilder {
            chunk: Chunk { name: name.into(), ..Chunk::default() },
            pools: Default::default(),
            int_index: HashMap::new(),
            float_index: HashMap::new(),
            string_index: HashMap::new(),
            addr_index: HashMap::new(),
            errors: Vec::new(),
        }
    }

    fn pool(&mut self, class: RegClass) -> Option<&mut RegPool> {
        class.index().map(|i| &mut self.pools[i])
    }

    pub fn alloc(&mut self, class: RegClass) -> u16 {
        self.alloc_many(class, 1)
    }

    /// Allocate `count` consecutive registers and return the first.
    pub fn alloc_many(&mut self, class: RegClass, count: u16) -> u16 {
        match self.pool(class).and_then(|p| p.get(count)) {
            Some(r) => r,
            None => {
                self.errors.push(EmitError::RegisterOverflow(class));
                0
            }
        }
    }

    pub fn release(&mut self, class: RegClass, reg: u16, count: u16) {
        let ok = self.pool(class).map(|p| p.release(reg, count)).unwrap_or(true);
        if !ok {
            tracing::error!(reg, ?class, "register released twice");
            self.errors.push(EmitError::DoubleFree { class, reg });
        }
    }

    pub fn reuse(&mut self, class: RegClass, reg: u16) {
        let ok = self.pool(class).map(|p| p.reuse(reg)).unwrap_or(true);
        if !ok {
            self.errors.push(EmitError::BadReuse { class, reg });
        }
    }

    pub fn live_registers(&self, class: RegClass) -> u32 {
        class.index().map(|i| self.pools[i].live()).unwrap_or(0)
    }

    pub fn int_const(&mut self, v: i32) -> u16 {
        if let Some(&i) = self.int_index.get(&v) {
            return i;
        }
        let i = self.chunk.int_consts.len() as u16;
        self.chunk.int_consts.push(v);
        self.int_index.insert(v, i);
        i
    }

    pub fn float_const(&mut self, v: f64) -> u16 {
        if let Some(&i) = self.float_index.get(&v.to_bits()) {
            return i;
        }
        let i = self.chunk.float_consts.len() as u16;
        self.chunk.float_consts.push(v);
        self.float_index.insert(v.to_bits(), i);
        i
    }

    pub fn string_const(&mut self, v: &str) -> u16 {
        if let Some(&i) = self.string_index.get(v) {
            return i;
        }
        let i = self.chunk.string_consts.len() as u16;
        self.chunk.string_consts.push(v.to_string());
        self.string_index.insert(v.to_string(), i);
        i
    }

    pub fn addr_const(&mut self, v: AddrConst) -> u16 {
        if let Some(&i) = self.addr_index.get(&v) {
            return i;
        }
        let i = self.chunk.addr_consts.len() as u16;
        self.chunk.addr_consts.push(v.clone());
        self.addr_index.insert(v, i);
        i
    }

    /// Position of a name literal in the chunk's name table.
    pub fn name_index(&mut self, name: &str) -> i32 {
        match self.chunk.names.iter().position(|n| n.eq_ignore_ascii_case(name)) {
            Some(i) => i as i32,
            None => {
                self.chunk.names.push(name.to_string());
                self.chunk.names.len() as i32 - 1
            }
        }
    }

    /// Intern a name literal; the integer pool entry holds its index.
    pub fn name_const(&mut self, name: &str) -> u16 {
        let index = self.name_index(name);
        self.int_const(index)
    }

    pub fn report(&mut self, error: EmitError) {
        tracing::error!(%error, "emission failed");
        self.errors.push(error);
    }

    fn check(&mut self, op: u8, value: i64, max: i64) -> bool {
        if value < 0 || value > max {
            self.errors.push(EmitError::OperandOverflow { op: op_name(op).unwrap_or("?"), value });
            return false;
        }
        true
    }

    pub fn emit_abc(&mut self, op: u8, a: u16, b: u16, c: u16) -> usize {
        for v in [a, b, c] {
            self.check(op, v as i64, 255);
        }
        self.emit(encode_abc(op, a as u8, b as u8, c as u8))
    }

    pub fn emit_abx(&mut self, op: u8, a: u16, bx: u16) -> usize {
        self.check(op, a as i64, 255);
        self.emit(encode_abx(op, a as u8, bx))
    }

    pub fn emit_asbx(&mut self, op: u8, a: u16, sbx: i32) -> usize {
        self.check(op, a as i64, 255);
        if !(i16::MIN as i32..=i16::MAX as i32).contains(&sbx) {
            self.errors.push(EmitError::OperandOverflow { op: op_name(op).unwrap_or("?"), value: sbx as i64 });
        }
        self.emit(encode_abx(op, a as u8, sbx as i16 as u16))
    }

    fn emit(&mut self, inst: u32) -> usize {
        let idx = self.chunk.code.len();
        self.chunk.code.push(inst);
        idx
    }

    /// `li` when the value fits the immediate field, `lk` otherwise.
    pub fn emit_load_int(&mut self, reg: u16, v: i32) {
        if (i16::MIN as i32..=i16::MAX as i32).contains(&v) {
            self.emit_asbx(OP_LI, reg, v);
        } else {
            let k = self.int_const(v);
            self.emit_abx(OP_LK, reg, k);
        }
    }

    pub fn emit_jmp_placeholder(&mut self) -> usize {
        self.emit_asbx(OP_JMP, 0, 0)
    }

    pub fn emit_jump_to(&mut self, target: usize) {
        let pos = self.pos();
        let offset = target as i64 - pos as i64 - 1;
        if offset < i16::MIN as i64 || offset > i16::MAX as i64 {
            self.errors.push(EmitError::JumpOutOfRange { from: pos, to: target });
        }
        self.emit_asbx(OP_JMP, 0, offset as i32);
    }

    /// Point the placeholder at `jump_pos` to the next instruction.
    pub fn patch_jump(&mut self, jump_pos: usize) {
        let target = self.pos();
        self.patch_jump_to(jump_pos, target);
    }

    pub fn patch_jump_to(&mut self, jump_pos: usize, target: usize) {
        let offset = target as i64 - jump_pos as i64 - 1;
        if offset < i16::MIN as i64 || offset > i16::MAX as i64 {
            self.errors.push(EmitError::JumpOutOfRange { from: jump_pos, to: target });
        }
        let inst = self.chunk.code[jump_pos];
        self.chunk.code[jump_pos] = (inst & 0xFFFF0000) | (offset as i16 as u16 as u32);
    }

    pub fn pos(&self) -> usize {
        self.chunk.code.len()
    }

    pub fn last_op(&self) -> Option<u8> {
        self.chunk.code.last().map(|inst| (inst >> 24) as u8)
    }

    pub fn code(&self) -> &[u32] {
        &self.chunk.code
    }

    pub fn set_returns(&mut self, returns: Vec<String>) {
        self.chunk.returns = returns;
    }

    pub fn finish(mut self) -> Result<Chunk, EmitError> {
        if let Some(e) = self.errors.into_iter().next() {
            return Err(e);
        }
        for (i, pool) in self.pools.iter().enumerate() {
            self.chunk.num_regs[i] = pool.high_water;
        }
        tracing::trace!(function = %self.chunk.name, instructions = self.chunk.code.len(), "chunk finished");
        Ok(self.chunk)
    }
}

// ── Expression results ───────────────────────────────────────────────

/// Where an emitted expression left its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpEmit {
    /// Register number, or constant pool index when `konst` is set.
    pub reg: u16,
    pub class: RegClass,
    pub konst: bool,
    /// Reserved register (self, locals, parameters); never freed by consumers.
    pub fixed: bool,
    /// Produced by a tail call; nothing may consume it.
    pub is_final: bool,
    /// The register is the variable itself rather than a pointer to it.
    pub target: bool,
}

impl Default for ExpEmit {
    fn default() -> Self {
        ExpEmit::nil()
    }
}

impl ExpEmit {
    pub fn nil() -> Self {
        ExpEmit { reg: 0, class: RegClass::Nil, konst: false, fixed: false, is_final: false, target: false }
    }

    pub fn alloc(b: &mut FunctionBuilder, class: RegClass) -> Self {
        ExpEmit { reg: b.alloc(class), class, ..ExpEmit::nil() }
    }

    pub fn konst(class: RegClass, index: u16) -> Self {
        ExpEmit { reg: index, class, konst: true, ..ExpEmit::nil() }
    }

    pub fn fixed(class: RegClass, reg: u16) -> Self {
        ExpEmit { reg, class, fixed: true, ..ExpEmit::nil() }
    }

    pub fn final_call() -> Self {
        ExpEmit { is_final: true, ..ExpEmit::nil() }
    }

    /// Return the register to its pool unless it is fixed or a constant.
    pub fn free(self, b: &mut FunctionBuilder) {
        if !self.fixed && !self.konst && self.class != RegClass::Nil {
            b.release(self.class, self.reg, 1);
        }
    }

    /// Mark a freed register live again so it can be written in place.
    pub fn reuse(self, b: &mut FunctionBuilder) {
        if !self.fixed && !self.konst && self.class != RegClass::Nil {
            b.reuse(self.class, self.reg);
        }
    }

    pub fn tag(self) -> u8 {
        match self.class.index() {
            Some(i) => i as u8 | if self.konst { REGT_KONST } else { 0 },
            None => REGT_NIL,
        }
    }
}
