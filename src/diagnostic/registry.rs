/// An entry in the error code registry.
pub struct ErrorEntry {
    pub code: &'static str,
    pub short: &'static str, // one line, for `explain --list`
    pub long: &'static str,  // markdown, for `explain CODE`
}

/// All stable diagnostic codes produced by the compiler.
pub static REGISTRY: &[ErrorEntry] = &[
    // ── Lexer / parser ───────────────────────────────────────────────────────
    ErrorEntry {
        code: "ACT-L001",
        short: "unexpected character",
        long: r#"## ACT-L001: unexpected character

The source contains a character that cannot start any token, or a string,
name or block comment that is never closed.

**Example:**

    health = $5;

Remove the stray character. Strings use double quotes (`"text"`), names use
single quotes (`'Name'`) and must end on the same line.
"#,
    },
    ErrorEntry {
        code: "ACT-P001",
        short: "unexpected token",
        long: r#"## ACT-P001: unexpected token

The parser found a token that cannot appear at this point.

**Common causes:**
- a missing `;` between two statements
- an unbalanced parenthesis or bracket
- an operator with a missing operand, as in `a = ;`

Parsing resumes at the next `;` or `}`, so later statements are still checked.
"#,
    },
    ErrorEntry {
        code: "ACT-P002",
        short: "unexpected end of input",
        long: r#"## ACT-P002: unexpected end of input

The source ended in the middle of a statement or expression. Usually the
final `;` or a closing `)` or `}` is missing.

**Example:**

    A_Chase()
"#,
    },
    ErrorEntry {
        code: "ACT-P003",
        short: "malformed literal",
        long: r#"## ACT-P003: malformed literal

An integer literal does not fit in 32 bits, or an array size is not an
integer constant. Literals above 2147483647 are read as `uint` and must not
exceed 4294967295.
"#,
    },

    // ── Types and coercion ───────────────────────────────────────────────────
    ErrorEntry {
        code: "ACT-T001",
        short: "incompatible types",
        long: r#"## ACT-T001: incompatible types

A value cannot be converted to the type the context requires. This covers
assignments, the branches of `?:` and explicit conversions.

**Example:**

    Actor a = 3;

Pointers only convert to pointers of a compatible class, and numbers only to
numbers.
"#,
    },
    ErrorEntry {
        code: "ACT-T002",
        short: "numeric type expected",
        long: r#"## ACT-T002: numeric type expected

An arithmetic operator, comparison or numeric builtin received a value that
is not an integer or a float, such as a string or an object pointer.

**Example:**

    return "5" * 2;
"#,
    },
    ErrorEntry {
        code: "ACT-T003",
        short: "integer type expected",
        long: r#"## ACT-T003: integer type expected

Shifts, `%` on some operand kinds and the bitwise operators `& | ^ ~` need
integer operands. Convert floats explicitly with `int(...)`.
"#,
    },
    ErrorEntry {
        code: "ACT-T004",
        short: "float truncated to int",
        long: r#"## ACT-T004: float truncated to int

A floating point value is implicitly converted to an integer and loses its
fraction. This is a warning; write `int(x)` to state the intent and silence it.
"#,
    },
    ErrorEntry {
        code: "ACT-T005",
        short: "division by zero",
        long: r#"## ACT-T005: division by zero

The right operand of `/` or `%` is the constant zero. This is rejected at
compile time whether or not the left operand is constant.
"#,
    },
    ErrorEntry {
        code: "ACT-T006",
        short: "aggregate assignment",
        long: r#"## ACT-T006: aggregate assignment

Arrays and structs cannot be assigned as a whole. Assign their elements or
members one at a time.
"#,
    },
    ErrorEntry {
        code: "ACT-T007",
        short: "operator not allowed on bool",
        long: r#"## ACT-T007: operator not allowed on bool

Unary minus and `~` are not defined for `bool`. Use `!` to negate a
condition.
"#,
    },
    ErrorEntry {
        code: "ACT-T008",
        short: "<>= needs numbers",
        long: r#"## ACT-T008: <>= needs numbers

The three-way comparison `a <>= b` yields -1, 0 or 1 and is only defined for
numeric operands.
"#,
    },
    ErrorEntry {
        code: "ACT-T009",
        short: "unknown color",
        long: r#"## ACT-T009: unknown color

A string converted to `color` is neither a known color name nor a hex
triplet such as `"ff 80 00"`. The color becomes black.
"#,
    },
    ErrorEntry {
        code: "ACT-T010",
        short: "not a constant",
        long: r#"## ACT-T010: not a constant

The expression must be evaluated at compile time but refers to something
only known at run time, such as a member variable or a function call.
"#,
    },
    ErrorEntry {
        code: "ACT-T011",
        short: "incompatible class types",
        long: r#"## ACT-T011: incompatible class types

A class-type conversion names a class that does not descend from the
target class.

**Example:**

    class<Inventory>('DoomImp')
"#,
    },
    ErrorEntry {
        code: "ACT-T012",
        short: "unknown class name",
        long: r#"## ACT-T012: unknown class name

A constant class-type conversion names no known class. The value becomes
`null`. This is fatal only with `--strict`.
"#,
    },
    ErrorEntry {
        code: "ACT-T013",
        short: "name used as a number",
        long: r#"## ACT-T013: name used as a number

A name literal was used where a number is expected. The lax dialect accepts
this and substitutes zero; otherwise it is an error.
"#,
    },
    ErrorEntry {
        code: "ACT-T014",
        short: "unknown type",
        long: r#"## ACT-T014: unknown type

A declaration or conversion names a type that is neither built in nor a
known class or struct.
"#,
    },

    // ── Resolution ───────────────────────────────────────────────────────────
    ErrorEntry {
        code: "ACT-R001",
        short: "unknown identifier",
        long: r#"## ACT-R001: unknown identifier

The name is not a local variable, a member of the current class or a global
constant. A suggestion is offered when a visible name is close in spelling.
"#,
    },
    ErrorEntry {
        code: "ACT-R002",
        short: "private member",
        long: r#"## ACT-R002: private member

The member variable is private to the class that declares it and cannot be
read from a descendant.
"#,
    },
    ErrorEntry {
        code: "ACT-R003",
        short: "deprecated member",
        long: r#"## ACT-R003: deprecated member

The member variable still works but is scheduled for removal. Use its
replacement.
"#,
    },
    ErrorEntry {
        code: "ACT-R004",
        short: "member not accessible here",
        long: r#"## ACT-R004: member not accessible here

A member variable was used where no suitable object is available: from a
static function, through a restricted self pointer, or as a static member.
"#,
    },
    ErrorEntry {
        code: "ACT-R005",
        short: "not addressable",
        long: r#"## ACT-R005: not addressable

Assignment, `++`/`--`, `sizeof` and `alignof` need a variable or member.
Constants and temporary results have no location.

**Example:**

    (health + 1) = 3;
"#,
    },
    ErrorEntry {
        code: "ACT-R006",
        short: "bad array or local",
        long: r#"## ACT-R006: bad array or local

Indexing was applied to something that is not an array, the index is not an
integer, or a local variable was declared with a type that cannot live in a
register.
"#,
    },
    ErrorEntry {
        code: "ACT-R007",
        short: "bad local declaration",
        long: r#"## ACT-R007: bad local declaration

A local variable is declared twice in the same block, or outside any block.
"#,
    },
    ErrorEntry {
        code: "ACT-R008",
        short: "invalid member access",
        long: r#"## ACT-R008: invalid member access

`object.name` needs an object pointer on the left and a member variable on
the right. Functions are called with `object.name(...)`.
"#,
    },
    ErrorEntry {
        code: "ACT-R009",
        short: "size of a constant",
        long: r#"## ACT-R009: size of a constant

`sizeof` and `alignof` describe storage, and constants have none.
"#,
    },

    // ── Control flow ─────────────────────────────────────────────────────────
    ErrorEntry {
        code: "ACT-C001",
        short: "jump outside a loop",
        long: r#"## ACT-C001: jump outside a loop

`break` and `continue` are only valid inside `while`, `do` and `for` bodies.
"#,
    },
    ErrorEntry {
        code: "ACT-C002",
        short: "infinite empty loop",
        long: r#"## ACT-C002: infinite empty loop

The loop condition is constantly true and the body does nothing, so the
function never finishes.

**Example:**

    while (true) ;
"#,
    },
    ErrorEntry {
        code: "ACT-C003",
        short: "inconsistent return types",
        long: r#"## ACT-C003: inconsistent return types

All `return` statements in a function must deduce to the same type. A bare
`return;` cannot be mixed with returns that carry a value.
"#,
    },

    // ── States ───────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "ACT-S001",
        short: "state label without a class",
        long: r#"## ACT-S001: state label without a class

A state label was used outside a class, or its scope names an unknown class,
as in `state("NoSuchClass::See")`.
"#,
    },
    ErrorEntry {
        code: "ACT-S002",
        short: "scope is not an ancestor",
        long: r#"## ACT-S002: scope is not an ancestor

A scoped state label `Class::Label` must name the current class or one of
its ancestors. `Super::Label` names the parent.
"#,
    },
    ErrorEntry {
        code: "ACT-S003",
        short: "unknown state label",
        long: r#"## ACT-S003: unknown state label

The label does not exist in the named class. The jump is looked up again at
run time, starting from the actor's own class rather than the named one.
This is fatal only with `--strict`.
"#,
    },
    ErrorEntry {
        code: "ACT-S004",
        short: "bad state index",
        long: r#"## ACT-S004: bad state index

A numeric state offset is negative, used outside a class, or points past the
states the class owns.
"#,
    },
    ErrorEntry {
        code: "ACT-S005",
        short: "runtime state index outside an action",
        long: r#"## ACT-S005: runtime state index outside an action

A state offset computed at run time needs the calling state, which only
action functions receive.
"#,
    },

    // ── Calls ────────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "ACT-F001",
        short: "unknown function",
        long: r#"## ACT-F001: unknown function

The call names no member function, math function, line special or builtin.
"#,
    },
    ErrorEntry {
        code: "ACT-F002",
        short: "wrong number of arguments",
        long: r#"## ACT-F002: wrong number of arguments

The call passes fewer arguments than the function requires or more than it
accepts.

**Example:**

    random(1);
"#,
    },
    ErrorEntry {
        code: "ACT-F003",
        short: "call needs an object",
        long: r#"## ACT-F003: call needs an object

A non-static function was called without an object, for instance from a
static function or through a class pointer.
"#,
    },
    ErrorEntry {
        code: "ACT-F004",
        short: "bad argument",
        long: r#"## ACT-F004: bad argument

An argument has the wrong kind, such as a string passed to a line special
that expects an integer. Named-script specials accept a name as their first
argument.
"#,
    },
    ErrorEntry {
        code: "ACT-F005",
        short: "named RNG not allowed",
        long: r#"## ACT-F005: named RNG not allowed

Only the random builtins accept a random number generator name in brackets,
as in `random[Boom](1, 6)`.
"#,
    },
    ErrorEntry {
        code: "ACT-F006",
        short: "bad member call target",
        long: r#"## ACT-F006: bad member call target

The left side of `object.Function(...)` must be an object or class pointer.
"#,
    },

    // ── Emission and environment ─────────────────────────────────────────────
    ErrorEntry {
        code: "ACT-E001",
        short: "code generation limit",
        long: r#"## ACT-E001: code generation limit

The function ran out of registers, a constant pool overflowed its operand
field, or a jump is too far to encode. Split the function into smaller ones.
"#,
    },
    ErrorEntry {
        code: "ACT-V001",
        short: "bad environment file",
        long: r#"## ACT-V001: bad environment file

The symbol environment passed with `--env` is not valid JSON, or refers to
an unknown parent class or type.
"#,
    },
];

/// Look up an error entry by code (e.g. `"ACT-T005"`).
pub fn lookup(code: &str) -> Option<&'static ErrorEntry> {
    REGISTRY.iter().find(|e| e.code.eq_ignore_ascii_case(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_code() {
        let e = lookup("ACT-T005").expect("ACT-T005 should be in registry");
        assert_eq!(e.code, "ACT-T005");
        assert!(!e.short.is_empty());
        assert!(e.long.contains("ACT-T005"));
        assert!(lookup("act-t005").is_some());
    }

    #[test]
    fn lookup_unknown_returns_none() {
        assert!(lookup("ACT-X999").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn all_codes_unique() {
        let mut codes: Vec<&str> = REGISTRY.iter().map(|e| e.code).collect();
        codes.sort_unstable();
        let len_before = codes.len();
        codes.dedup();
        assert_eq!(codes.len(), len_before, "duplicate codes in registry");
    }

    #[test]
    fn long_text_starts_with_its_code() {
        for entry in REGISTRY {
            assert!(!entry.short.is_empty(), "{} missing short description", entry.code);
            assert!(entry.long.starts_with(&format!("## {}:", entry.code)), "{}", entry.code);
        }
    }

    #[test]
    fn every_emitted_code_is_registered() {
        let sources = [
            include_str!("../compiler/access.rs"),
            include_str!("../compiler/binary.rs"),
            include_str!("../compiler/builtins.rs"),
            include_str!("../compiler/calls.rs"),
            include_str!("../compiler/cast.rs"),
            include_str!("../compiler/context.rs"),
            include_str!("../compiler/mod.rs"),
            include_str!("../compiler/operators.rs"),
            include_str!("../compiler/states.rs"),
            include_str!("../compiler/stmt.rs"),
            include_str!("../parser/mod.rs"),
            include_str!("mod.rs"),
        ];
        for src in sources {
            for (at, _) in src.match_indices("\"ACT-") {
                let code = &src[at + 1..at + 9];
                assert!(lookup(code).is_some(), "{code} is not in the registry");
            }
        }
    }
}
