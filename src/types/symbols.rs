use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use super::{FloatKind, IntKind, Type};
use crate::value::Constant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub u32);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldFlags {
    pub private: bool,
    pub deprecated: bool,
    pub is_static: bool,
    pub readonly: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub offset: u32,
    pub flags: FieldFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionKind {
    Static,
    Method,
    Action,
}

impl FunctionKind {
    /// Pointer arguments passed ahead of the declared parameters.
    pub fn implicit_args(self) -> u16 {
        match self {
            FunctionKind::Static => 0,
            FunctionKind::Method => 1,
            FunctionKind::Action => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub kind: FunctionKind,
    pub params: Vec<Type>,
    pub returns: Vec<Type>,
    pub owner: ClassId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    Const(Constant),
    Field(Field),
    Function(FunctionDef),
}

impl Symbol {
    pub fn name(&self) -> &str {
        match self {
            Symbol::Const(_) => "",
            Symbol::Field(f) => &f.name,
            Symbol::Function(f) => &f.name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub parent: Option<ClassId>,
    pub size: u32,
    symbols: HashMap<String, Symbol>,
    labels: Vec<(String, StateId)>,
    pub first_state: u32,
    pub num_owned_states: u32,
}

impl ClassDef {
    pub fn own_symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(&name.to_ascii_lowercase())
    }
}

#[derive(Debug, Clone)]
pub struct StateDef {
    pub owner: ClassId,
    pub label: String,
    pub frame: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LineSpecial {
    pub name: String,
    pub number: i32,
    pub min_args: u8,
    pub max_args: u8,
}

#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("invalid environment JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("class '{0}' is defined twice")]
    DuplicateClass(String),
    #[error("class '{class}' inherits from unknown class '{parent}'")]
    UnknownParent { class: String, parent: String },
    #[error("unknown type '{ty}' in {context}")]
    UnknownType { ty: String, context: String },
    #[error("unknown field flag '{0}'")]
    BadFlag(String),
}

// ── Environment file format ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct EnvFile {
    #[serde(default)]
    classes: Vec<ClassFile>,
    #[serde(default)]
    constants: BTreeMap<String, ConstFile>,
    #[serde(default)]
    specials: Vec<LineSpecial>,
    #[serde(default)]
    sounds: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ClassFile {
    name: String,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    fields: Vec<FieldFile>,
    #[serde(default)]
    constants: BTreeMap<String, ConstFile>,
    #[serde(default)]
    functions: Vec<FunctionFile>,
    #[serde(default)]
    states: Vec<StateFile>,
}

#[derive(Debug, Deserialize)]
struct FieldFile {
    name: String,
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    flags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FunctionFile {
    name: String,
    kind: FunctionKind,
    #[serde(default)]
    params: Vec<String>,
    #[serde(default)]
    returns: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StateFile {
    label: String,
    #[serde(default = "one_frame")]
    frames: u32,
}

fn one_frame() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConstFile {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ConstFile {
    fn into_constant(self) -> Constant {
        match self {
            ConstFile::Int(v) => Constant::int(v as i32),
            ConstFile::Float(v) => Constant::float(v),
            ConstFile::Text(s) => Constant::string(s),
        }
    }
}

// ── Symbol table ─────────────────────────────────────────────────────

/// Everything the compiler can look up: classes with their members and
/// state tables, global constants, line specials and sounds.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    classes: Vec<ClassDef>,
    class_index: HashMap<String, ClassId>,
    states: Vec<StateDef>,
    globals: HashMap<String, Constant>,
    global_names: Vec<String>,
    specials: Vec<LineSpecial>,
    sounds: Vec<String>,
}

static BUILTIN_ENV: &str = include_str!("builtin_env.json");

impl SymbolTable {
    /// The stock environment: `Actor` and a few descendants, common line
    /// specials and sounds.
    pub fn builtin() -> Result<Self, EnvError> {
        let mut table = SymbolTable::default();
        table.load_json(BUILTIN_ENV)?;
        Ok(table)
    }

    /// Add the declarations from a JSON environment file. Classes may refer to
    /// classes declared earlier in the same file or in previous loads.
    pub fn load_json(&mut self, text: &str) -> Result<(), EnvError> {
        let file: EnvFile = serde_json::from_str(text)?;

        for (name, value) in file.constants {
            self.global_names.push(name.clone());
            self.globals.insert(name.to_ascii_lowercase(), value.into_constant());
        }
        for special in file.specials {
            self.specials.retain(|s| !s.name.eq_ignore_ascii_case(&special.name));
            self.specials.push(special);
        }
        for sound in file.sounds {
            if self.sound_id(&sound) == 0 {
                self.sounds.push(sound);
            }
        }

        // Register names first so field types can point at any class in the file.
        let first_new = self.classes.len();
        for class in &file.classes {
            let key = class.name.to_ascii_lowercase();
            if self.class_index.contains_key(&key) {
                return Err(EnvError::DuplicateClass(class.name.clone()));
            }
            let id = ClassId(self.classes.len() as u32);
            self.class_index.insert(key, id);
            self.classes.push(ClassDef {
                name: class.name.clone(),
                parent: None,
                size: 0,
                symbols: HashMap::new(),
                labels: Vec::new(),
                first_state: 0,
                num_owned_states: 0,
            });
        }

        for (i, class) in file.classes.into_iter().enumerate() {
            self.define_class(ClassId((first_new + i) as u32), class)?;
        }
        Ok(())
    }

    fn define_class(&mut self, id: ClassId, file: ClassFile) -> Result<(), EnvError> {
        let parent = match &file.parent {
            Some(p) => {
                let pid = self.class_by_name(p).filter(|pid| *pid != id).ok_or_else(|| {
                    EnvError::UnknownParent { class: file.name.clone(), parent: p.clone() }
                })?;
                Some(pid)
            }
            None => None,
        };

        let mut size = parent.map(|p| self.class(p).size).unwrap_or(0);
        let mut symbols = HashMap::new();

        for field in file.fields {
            let ty = self.parse_type(&field.ty).ok_or_else(|| EnvError::UnknownType {
                ty: field.ty.clone(),
                context: format!("field '{}.{}'", file.name, field.name),
            })?;
            let mut flags = FieldFlags::default();
            for flag in &field.flags {
                match flag.as_str() {
                    "private" => flags.private = true,
                    "deprecated" => flags.deprecated = true,
                    "static" => flags.is_static = true,
                    "readonly" => flags.readonly = true,
                    other => return Err(EnvError::BadFlag(other.to_string())),
                }
            }
            let offset = if flags.is_static {
                0
            } else {
                let align = ty.align().max(1);
                let offset = size.div_ceil(align) * align;
                size = offset + ty.size();
                offset
            };
            symbols.insert(
                field.name.to_ascii_lowercase(),
                Symbol::Field(Field { name: field.name, ty, offset, flags }),
            );
        }

        for (name, value) in file.constants {
            symbols.insert(name.to_ascii_lowercase(), Symbol::Const(value.into_constant()));
        }

        for func in file.functions {
            let parse_list = |list: &[String], what: &str| -> Result<Vec<Type>, EnvError> {
                list.iter()
                    .map(|t| {
                        self.parse_type(t).ok_or_else(|| EnvError::UnknownType {
                            ty: t.clone(),
                            context: format!("{what} of '{}.{}'", file.name, func.name),
                        })
                    })
                    .collect()
            };
            let params = parse_list(&func.params, "parameters")?;
            let returns = parse_list(&func.returns, "returns")?;
            symbols.insert(
                func.name.to_ascii_lowercase(),
                Symbol::Function(FunctionDef { name: func.name, kind: func.kind, params, returns, owner: id }),
            );
        }

        let first_state = self.states.len() as u32;
        let mut labels = Vec::new();
        for state in file.states {
            labels.push((state.label.to_ascii_lowercase(), StateId(self.states.len() as u32)));
            for frame in 0..state.frames.max(1) {
                self.states.push(StateDef { owner: id, label: state.label.clone(), frame });
            }
        }
        let num_owned_states = self.states.len() as u32 - first_state;

        let class = &mut self.classes[id.0 as usize];
        class.parent = parent;
        class.size = size.div_ceil(8) * 8;
        class.symbols = symbols;
        class.labels = labels;
        class.first_state = first_state;
        class.num_owned_states = num_owned_states;
        Ok(())
    }

    pub fn class_by_name(&self, name: &str) -> Option<ClassId> {
        self.class_index.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn class(&self, id: ClassId) -> &ClassDef {
        &self.classes[id.0 as usize]
    }

    pub fn class_name(&self, id: ClassId) -> &str {
        &self.class(id).name
    }

    pub fn parent_of(&self, id: ClassId) -> Option<ClassId> {
        self.class(id).parent
    }

    /// True when `class` is `ancestor` or inherits from it.
    pub fn is_descendant_of(&self, class: ClassId, ancestor: ClassId) -> bool {
        let mut cur = Some(class);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.parent_of(c);
        }
        false
    }

    /// Look a symbol up in `class` and its ancestors. Also returns the class
    /// whose table the symbol was found in.
    pub fn find_symbol(&self, class: ClassId, name: &str) -> Option<(&Symbol, ClassId)> {
        let key = name.to_ascii_lowercase();
        let mut cur = Some(class);
        while let Some(c) = cur {
            let def = self.class(c);
            if let Some(sym) = def.symbols.get(&key) {
                return Some((sym, c));
            }
            cur = def.parent;
        }
        None
    }

    /// Names of all members visible from `class`.
    pub fn member_names(&self, class: ClassId) -> Vec<String> {
        let mut names = Vec::new();
        let mut cur = Some(class);
        while let Some(c) = cur {
            let def = self.class(c);
            names.extend(def.symbols.iter().map(|(key, sym)| match sym.name() {
                "" => key.clone(),
                n => n.to_string(),
            }));
            cur = def.parent;
        }
        names
    }

    pub fn global_constant(&self, name: &str) -> Option<&Constant> {
        self.globals.get(&name.to_ascii_lowercase())
    }

    pub fn global_names(&self) -> &[String] {
        &self.global_names
    }

    pub fn line_special(&self, name: &str) -> Option<&LineSpecial> {
        self.specials.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Sound ids start at 1; 0 is "no sound".
    pub fn sound_id(&self, name: &str) -> i32 {
        self.sounds
            .iter()
            .position(|s| s.eq_ignore_ascii_case(name))
            .map(|i| i as i32 + 1)
            .unwrap_or(0)
    }

    pub fn sound_name(&self, id: i32) -> &str {
        if id <= 0 {
            return "";
        }
        self.sounds.get(id as usize - 1).map(String::as_str).unwrap_or("")
    }

    pub fn state(&self, id: StateId) -> &StateDef {
        &self.states[id.0 as usize]
    }

    pub fn state_count(&self) -> u32 {
        self.states.len() as u32
    }

    pub fn owns_state(&self, class: ClassId, state: StateId) -> bool {
        let def = self.class(class);
        state.0 >= def.first_state && state.0 < def.first_state + def.num_owned_states
    }

    /// Find a state by dotted label path. Without `exact` the deepest matching
    /// prefix wins, so `Death.Burn` falls back to `Death`.
    pub fn find_state(&self, class: ClassId, names: &[String], exact: bool) -> Option<StateId> {
        for depth in (1..=names.len()).rev() {
            if exact && depth != names.len() {
                break;
            }
            let key = names[..depth].join(".").to_ascii_lowercase();
            let mut cur = Some(class);
            while let Some(c) = cur {
                let def = self.class(c);
                if let Some((_, state)) = def.labels.iter().find(|(label, _)| *label == key) {
                    return Some(*state);
                }
                cur = def.parent;
            }
        }
        None
    }

    /// Human readable type name, as used in diagnostics.
    pub fn describe(&self, ty: &Type) -> String {
        match ty {
            Type::Error => "<error>".into(),
            Type::Void => "void".into(),
            Type::Bool => "bool".into(),
            Type::Int(k) => match k {
                IntKind::I8 => "int8",
                IntKind::U8 => "uint8",
                IntKind::I16 => "int16",
                IntKind::U16 => "uint16",
                IntKind::I32 => "int",
                IntKind::U32 => "uint",
            }
            .into(),
            Type::Float(FloatKind::F32) => "float".into(),
            Type::Float(FloatKind::F64) => "double".into(),
            Type::Name => "name".into(),
            Type::String => "string".into(),
            Type::Sound => "sound".into(),
            Type::Color => "color".into(),
            Type::State => "state".into(),
            Type::NullPtr => "null".into(),
            Type::Object(c) => self.class_name(*c).to_string(),
            Type::ClassPtr(c) => format!("class<{}>", self.class_name(*c)),
            Type::Struct(name) => name.clone(),
            Type::Array { elem, count } => format!("{}[{count}]", self.describe(elem)),
        }
    }

    /// Parse a type written the way [`describe`](Self::describe) prints it.
    pub fn parse_type(&self, text: &str) -> Option<Type> {
        let text = text.trim();
        if let Some(open) = text.rfind('[') {
            let count = text[open + 1..].strip_suffix(']')?.trim().parse().ok()?;
            let elem = self.parse_type(&text[..open])?;
            return Some(Type::Array { elem: Box::new(elem), count });
        }
        if let Some(inner) = text.strip_prefix("class<").and_then(|t| t.strip_suffix('>')) {
            return self.class_by_name(inner.trim()).map(Type::ClassPtr);
        }
        if let Some(name) = text.strip_prefix("struct ") {
            return Some(Type::Struct(name.trim().to_string()));
        }
        let ty = match text.to_ascii_lowercase().as_str() {
            "void" => Type::Void,
            "bool" => Type::Bool,
            "int8" | "sbyte" => Type::Int(IntKind::I8),
            "uint8" | "byte" => Type::Int(IntKind::U8),
            "int16" | "short" => Type::Int(IntKind::I16),
            "uint16" | "ushort" => Type::Int(IntKind::U16),
            "int" | "int32" => Type::INT,
            "uint" | "uint32" => Type::UINT,
            "float" | "float32" => Type::Float(FloatKind::F32),
            "double" | "float64" => Type::DOUBLE,
            "name" => Type::Name,
            "string" => Type::String,
            "sound" => Type::Sound,
            "color" => Type::Color,
            "state" => Type::State,
            _ => return self.class_by_name(text).map(Type::Object),
        };
        Some(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SymbolTable {
        SymbolTable::builtin().unwrap()
    }

    #[test]
    fn builtin_environment_loads() {
        let t = table();
        let actor = t.class_by_name("actor").unwrap();
        let imp = t.class_by_name("DoomImp").unwrap();
        assert_eq!(t.class_name(actor), "Actor");
        assert!(t.is_descendant_of(imp, actor));
        assert!(!t.is_descendant_of(actor, imp));
    }

    #[test]
    fn field_layout_respects_alignment() {
        let t = table();
        let actor = t.class_by_name("Actor").unwrap();
        let Some((Symbol::Field(speed), _)) = t.find_symbol(actor, "speed") else {
            panic!("speed should be a field");
        };
        assert_eq!(speed.offset % 8, 0);
        let imp = t.class_by_name("DoomImp").unwrap();
        let Some((Symbol::Field(fb), origin)) = t.find_symbol(imp, "fireballs") else {
            panic!("fireballs should be a field");
        };
        assert_eq!(origin, imp);
        assert!(fb.offset >= t.class(actor).size);
    }

    #[test]
    fn inherited_symbols_report_their_table() {
        let t = table();
        let imp = t.class_by_name("DoomImp").unwrap();
        let actor = t.class_by_name("Actor").unwrap();
        let (_, origin) = t.find_symbol(imp, "HEALTH").unwrap();
        assert_eq!(origin, actor);
    }

    #[test]
    fn find_state_falls_back_to_prefix() {
        let t = table();
        let imp = t.class_by_name("DoomImp").unwrap();
        let names = |s: &str| s.split('.').map(String::from).collect::<Vec<_>>();
        let death = t.find_state(imp, &names("Death"), false).unwrap();
        let fire = t.find_state(imp, &names("Death.Fire"), false).unwrap();
        assert_ne!(death, fire);
        assert_eq!(t.find_state(imp, &names("Death.Ice"), false), Some(death));
        assert_eq!(t.find_state(imp, &names("Death.Ice"), true), None);
        assert_eq!(t.find_state(imp, &names("Gibbed"), false), None);
    }

    #[test]
    fn inherited_state_labels() {
        let t = table();
        let dark = t.class_by_name("DarkImp").unwrap();
        let imp = t.class_by_name("DoomImp").unwrap();
        let see = t.find_state(dark, &["See".to_string()], true).unwrap();
        assert!(t.owns_state(imp, see));
        assert!(!t.owns_state(dark, see));
    }

    #[test]
    fn parse_and_describe_types() {
        let t = table();
        for text in ["int", "uint8", "double", "class<Actor>", "int[5]", "Actor", "state"] {
            let ty = t.parse_type(text).unwrap();
            assert_eq!(t.describe(&ty), text);
        }
        assert!(t.parse_type("Nonexistent").is_none());
    }

    #[test]
    fn sounds_and_specials() {
        let t = table();
        let id = t.sound_id("IMP/SIGHT");
        assert!(id > 0);
        assert_eq!(t.sound_name(id), "imp/sight");
        assert_eq!(t.sound_id("nope"), 0);
        assert_eq!(t.line_special("door_open").unwrap().number, 11);
    }

    #[test]
    fn duplicate_and_unknown_parent_rejected() {
        let mut t = table();
        let err = t.load_json(r#"{"classes":[{"name":"Actor"}]}"#).unwrap_err();
        assert!(matches!(err, EnvError::DuplicateClass(_)));
        let err = t.load_json(r#"{"classes":[{"name":"Zombie","parent":"Ghost"}]}"#).unwrap_err();
        assert!(err.to_string().contains("Ghost"));
    }
}
