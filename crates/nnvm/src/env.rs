use std::env;
use std::sync::OnceLock;

static NNVM_CHECK_FINITE: OnceLock<bool> = OnceLock::new();
static NNVM_DUMP_STACKVM: OnceLock<bool> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

fn flag(cell: &OnceLock<bool>, name: &str) -> bool {
    *cell.get_or_init(|| match env::var(name) {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => false,
    })
}

/// `NNVM_CHECK_FINITE`: warn when an evaluated f32 output holds NaN or Inf.
pub fn check_finite_enabled() -> bool {
    flag(&NNVM_CHECK_FINITE, "NNVM_CHECK_FINITE")
}

/// `NNVM_DUMP_STACKVM`: log the disassembly of every built stack VM module.
pub fn dump_stackvm_enabled() -> bool {
    flag(&NNVM_DUMP_STACKVM, "NNVM_DUMP_STACKVM")
}
