use std::fmt::Write;

use super::*;

fn tag_operand(chunk: &Chunk, tag: u8, reg: u16) -> String {
    if tag == REGT_NIL {
        return "nil".into();
    }
    let class = RegClass::ALL[(tag & 3) as usize];
    if tag & REGT_KONST != 0 {
        format!("k{reg}{}", konst_comment(chunk, class, reg))
    } else {
        format!("{}{reg}", class.prefix())
    }
}

fn konst_comment(chunk: &Chunk, class: RegClass, index: u16) -> String {
    let i = index as usize;
    let text = match class {
        RegClass::Int => chunk.int_consts.get(i).map(|v| v.to_string()),
        RegClass::Float => chunk.float_consts.get(i).map(|v| format!("{v:?}")),
        RegClass::String => chunk.string_consts.get(i).map(|v| format!("{v:?}")),
        RegClass::Pointer => chunk.addr_consts.get(i).map(addr_text),
        RegClass::Nil => None,
    };
    text.map(|t| format!("({t})")).unwrap_or_default()
}

fn addr_text(a: &AddrConst) -> String {
    match a {
        AddrConst::Null => "null".into(),
        AddrConst::State { id, label } => format!("state {label}#{id}"),
        AddrConst::Class { name } => format!("class {name}"),
        AddrConst::Native { function } => function.name().into(),
        AddrConst::Function { name } => name.clone(),
        AddrConst::Rng { name } if name.is_empty() => "rng <default>".into(),
        AddrConst::Rng { name } => format!("rng {name}"),
    }
}

/// Render one instruction.
pub fn instruction(chunk: &Chunk, pos: usize) -> String {
    let inst = chunk.code[pos];
    let (op, a, b, c) = decode(inst);
    let name = op_name(op).unwrap_or("???");
    let operands = match op {
        OP_JMP => {
            let off = decode_sbx(inst) as i64;
            format!("{off:+} -> {:04}", pos as i64 + 1 + off)
        }
        OP_LI | OP_PARAMI | OP_RETI => format!("{a}, {}", decode_sbx(inst)),
        OP_LK => format!("d{a}, k{}{}", decode_bx(inst), konst_comment(chunk, RegClass::Int, decode_bx(inst))),
        OP_LKF => format!("f{a}, k{}{}", decode_bx(inst), konst_comment(chunk, RegClass::Float, decode_bx(inst))),
        OP_LKS => format!("s{a}, k{}{}", decode_bx(inst), konst_comment(chunk, RegClass::String, decode_bx(inst))),
        OP_LKP => format!("a{a}, k{}{}", decode_bx(inst), konst_comment(chunk, RegClass::Pointer, decode_bx(inst))),
        OP_PARAM | OP_RESULT => tag_operand(chunk, a, decode_bx(inst)),
        OP_TEST | OP_BOUND | OP_IJMP => format!("d{a}, {}", decode_bx(inst)),
        OP_RET => {
            let slot = if a as u16 & RET_FINAL != 0 { "final".to_string() } else { a.to_string() };
            format!("{slot}, {}", tag_operand(chunk, b, c as u16))
        }
        OP_CALL_K | OP_TAIL_K => format!(
            "k{a}{}, {b}, {c}",
            konst_comment(chunk, RegClass::Pointer, a as u16)
        ),
        _ => format!("{a}, {b}, {c}"),
    };
    format!("{name:<8} {operands}")
}

/// Human readable listing of a chunk.
pub fn disassemble(chunk: &Chunk) -> String {
    let mut out = String::new();
    let [d, f, s, p] = chunk.num_regs;
    let _ = writeln!(out, "; {}  regs d:{d} f:{f} s:{s} a:{p}", chunk.name);
    if !chunk.returns.is_empty() {
        let _ = writeln!(out, "; returns {}", chunk.returns.join(", "));
    }
    for pos in 0..chunk.code.len() {
        let _ = writeln!(out, "{pos:04}  {}", instruction(chunk, pos));
    }
    if !chunk.names.is_empty() {
        let _ = writeln!(out, "; names {}", chunk.names.join(", "));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_shows_jump_targets_and_constants() {
        let mut b = FunctionBuilder::new("demo");
        let r = b.alloc(RegClass::Float);
        let k = b.float_const(2.5);
        b.emit_abx(OP_LKF, r, k);
        let j = b.emit_jmp_placeholder();
        b.emit_asbx(OP_LI, 0, 7);
        b.patch_jump(j);
        b.emit_abc(OP_RET, RET_FINAL, REGT_NIL as u16, 0);
        let chunk = b.finish().unwrap();
        let text = disassemble(&chunk);
        assert!(text.contains("lkf      f0, k0(2.5)"), "{text}");
        assert!(text.contains("jmp      +1 -> 0003"), "{text}");
        assert!(text.contains("ret      final, nil"), "{text}");
    }
}
