//! Mapping of JSON named arguments onto declared parameter positions.

use crate::fault::Fault;
use crate::registry::ProcedureEntry;
use crate::value::{Struct, Value};

/// Orders named arguments by the entry's declared parameter names.
///
/// Every declared name must be supplied and no other name may appear.
pub(super) fn bind_arguments(entry: &ProcedureEntry, members: &Struct) -> Result<Vec<Value>, Fault> {
    let declared = entry.param_names();
    if declared.is_empty() && !members.is_empty() {
        return Err(Fault::invalid_params(format!(
            "{} does not declare parameter names",
            entry.name()
        )));
    }
    if let Some(unknown) = members
        .keys()
        .find(|name| !declared.iter().any(|declared_name| declared_name == *name))
    {
        return Err(Fault::invalid_params(format!(
            "{} has no parameter named {unknown:?}",
            entry.name()
        )));
    }
    declared
        .iter()
        .map(|name| {
            members.get(name).cloned().ok_or_else(|| {
                Fault::invalid_params(format!("{} is missing argument {name:?}", entry.name()))
            })
        })
        .collect()
}
