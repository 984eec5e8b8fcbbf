//! Models of library functions' memory behavior.
//!
//! A model declares, per argument index, the byte interval the function
//! defines or uses through that argument. Interval ends are either
//! constant byte offsets, references to another argument's concrete
//! integer value, or unknown.
//!
//! The same shape is parseable from a text file of lines
//! `name kind idx from to` with `kind` one of `def`/`use`, and `from`/`to`
//! either an integer, `#N` for argument N's value, or `?` for unknown.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use crate::errors::{DepgraphError, Result};
use crate::shared::models::Value;
use crate::shared::offset::Offset;

/// One end of a modelled byte interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelOffset {
    Byte(u64),
    /// The concrete integer value of the call's n-th argument.
    Operand(usize),
    Unknown,
}

impl ModelOffset {
    /// Resolve against the actual call arguments.
    pub fn resolve(&self, args: &[Value]) -> Offset {
        match self {
            ModelOffset::Byte(b) => Offset::new(*b),
            ModelOffset::Operand(i) => args
                .get(*i)
                .and_then(|v| v.const_int())
                .filter(|c| *c >= 0)
                .map(|c| Offset::new(c as u64))
                .unwrap_or(Offset::UNKNOWN),
            ModelOffset::Unknown => Offset::UNKNOWN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInterval {
    pub from: ModelOffset,
    pub to: ModelOffset,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperandModel {
    pub defines: Option<ModelInterval>,
    pub uses: Option<ModelInterval>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionModel {
    pub name: String,
    operands: FxHashMap<usize, OperandModel>,
}

impl FunctionModel {
    pub fn new(name: impl Into<String>) -> Self {
        FunctionModel {
            name: name.into(),
            operands: FxHashMap::default(),
        }
    }

    pub fn handles(&self, idx: usize) -> bool {
        self.operands.contains_key(&idx)
    }

    pub fn defines(&self, idx: usize) -> Option<&ModelInterval> {
        self.operands.get(&idx)?.defines.as_ref()
    }

    pub fn uses(&self, idx: usize) -> Option<&ModelInterval> {
        self.operands.get(&idx)?.uses.as_ref()
    }

    pub fn add_def(mut self, idx: usize, from: ModelOffset, to: ModelOffset) -> Self {
        self.operands.entry(idx).or_default().defines = Some(ModelInterval { from, to });
        self
    }

    pub fn add_use(mut self, idx: usize, from: ModelOffset, to: ModelOffset) -> Self {
        self.operands.entry(idx).or_default().uses = Some(ModelInterval { from, to });
        self
    }

    /// The built-in model table for the common libc memory and string
    /// functions.
    pub fn default_models() -> FxHashMap<String, FunctionModel> {
        DEFAULT_MODELS.clone()
    }

    /// Parse a model file: one `name kind idx from to` entry per line.
    /// Empty lines and lines starting with `#` are skipped (unless the
    /// `#` is an operand reference in offset position).
    pub fn parse_file(content: &str) -> Result<FxHashMap<String, FunctionModel>> {
        let mut models: FxHashMap<String, FunctionModel> = FxHashMap::default();

        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 5 {
                return Err(DepgraphError::config(format!(
                    "function model line {}: expected 'name kind idx from to'",
                    lineno + 1
                )));
            }

            let name = fields[0];
            let idx: usize = fields[2].parse().map_err(|_| {
                DepgraphError::config(format!(
                    "function model line {}: bad argument index '{}'",
                    lineno + 1,
                    fields[2]
                ))
            })?;
            let from = parse_offset(fields[3], lineno)?;
            let to = parse_offset(fields[4], lineno)?;

            let model = models
                .entry(name.to_string())
                .or_insert_with(|| FunctionModel::new(name));
            match fields[1] {
                "def" => {
                    model.operands.entry(idx).or_default().defines =
                        Some(ModelInterval { from, to })
                }
                "use" => {
                    model.operands.entry(idx).or_default().uses = Some(ModelInterval { from, to })
                }
                other => {
                    return Err(DepgraphError::config(format!(
                        "function model line {}: kind must be def or use, got '{}'",
                        lineno + 1,
                        other
                    )))
                }
            }
        }

        Ok(models)
    }
}

fn parse_offset(field: &str, lineno: usize) -> Result<ModelOffset> {
    if field == "?" {
        return Ok(ModelOffset::Unknown);
    }
    if let Some(rest) = field.strip_prefix('#') {
        let idx: usize = rest.parse().map_err(|_| {
            DepgraphError::config(format!(
                "function model line {}: bad operand reference '{}'",
                lineno + 1,
                field
            ))
        })?;
        return Ok(ModelOffset::Operand(idx));
    }
    let byte: u64 = field.parse().map_err(|_| {
        DepgraphError::config(format!(
            "function model line {}: bad offset '{}'",
            lineno + 1,
            field
        ))
    })?;
    Ok(ModelOffset::Byte(byte))
}

static DEFAULT_MODELS: Lazy<FxHashMap<String, FunctionModel>> = Lazy::new(|| {
    use ModelOffset::{Byte, Operand, Unknown};

    let mut table = FxHashMap::default();
    let mut add = |m: FunctionModel| {
        table.insert(m.name.clone(), m);
    };

    for name in [
        "memcpy",
        "memmove",
        "__memcpy_chk",
        "llvm.memcpy.p0i8.p0i8.i32",
        "llvm.memcpy.p0i8.p0i8.i64",
        "llvm.memmove.p0i8.p0i8.i32",
        "llvm.memmove.p0i8.p0i8.i64",
    ] {
        add(FunctionModel::new(name)
            .add_def(0, Byte(0), Operand(2))
            .add_use(1, Byte(0), Operand(2)));
    }

    for name in ["memset", "llvm.memset.p0i8.i32", "llvm.memset.p0i8.i64"] {
        add(FunctionModel::new(name).add_def(0, Byte(0), Operand(2)));
    }

    add(FunctionModel::new("memcmp")
        .add_use(0, Byte(0), Operand(2))
        .add_use(1, Byte(0), Operand(2)));

    for name in ["strlen", "strchr", "strrchr"] {
        add(FunctionModel::new(name).add_use(0, Byte(0), Unknown));
    }

    add(FunctionModel::new("strcpy")
        .add_def(0, Byte(0), Unknown)
        .add_use(1, Byte(0), Unknown));
    add(FunctionModel::new("strncpy")
        .add_def(0, Byte(0), Operand(2))
        .add_use(1, Byte(0), Operand(2)));

    table
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_models_memcpy() {
        let models = FunctionModel::default_models();
        let m = models.get("memcpy").expect("memcpy modelled");
        assert!(m.handles(0));
        assert!(m.handles(1));
        assert!(m.defines(0).is_some());
        assert!(m.uses(1).is_some());
        assert!(m.defines(1).is_none());
    }

    #[test]
    fn operand_reference_resolves_against_call_args() {
        let off = ModelOffset::Operand(2);
        let args = [Value::Null, Value::Null, Value::ConstInt(8)];
        assert_eq!(off.resolve(&args), Offset::new(8));

        let symbolic = [Value::Null, Value::Null, Value::Instr(
            crate::shared::models::ValueId(4),
        )];
        assert_eq!(off.resolve(&symbolic), Offset::UNKNOWN);
    }

    #[test]
    fn parse_round_trips_the_line_format() {
        let content = "\
# comment
mycopy def 0 0 #2
mycopy use 1 0 ?
";
        let models = FunctionModel::parse_file(content).expect("parses");
        let m = models.get("mycopy").expect("modelled");
        assert_eq!(
            m.defines(0),
            Some(&ModelInterval {
                from: ModelOffset::Byte(0),
                to: ModelOffset::Operand(2)
            })
        );
        assert_eq!(
            m.uses(1),
            Some(&ModelInterval {
                from: ModelOffset::Byte(0),
                to: ModelOffset::Unknown
            })
        );
    }

    #[test]
    fn parse_rejects_malformed_lines() {
        assert!(FunctionModel::parse_file("broken def 0 0").is_err());
        assert!(FunctionModel::parse_file("f bad 0 0 1").is_err());
    }
}
