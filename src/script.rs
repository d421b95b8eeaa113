// addon-shell/src/script.rs

//! Replay-script instructions and their line rendering.

use std::collections::BTreeSet;

use crate::{
    parameter::ParameterKind,
    settings::Property,
    value::{quote_token, ParamValue, Value},
};

#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    /// `checker` is the item checker's type name; list-ness comes from `value`.
    Create { name: String, value: ParamValue, local: bool, checker: String },
    Set { name: String, value: ParamValue },
    Add { name: String, values: Vec<Value> },
    Subtract { name: String, values: Vec<Value> },
    Unset { name: String },
    SetProperty { name: String, property: Property, value: Value },
}

fn join_values(values: &[Value]) -> String {
    values.iter().map(Value::to_token).collect::<Vec<_>>().join(" ")
}

fn with_values(head: String, values: &[Value]) -> String {
    if values.is_empty() { head } else { format!("{head} {}", join_values(values)) }
}

impl Instruction {
    pub fn name(&self) -> &str {
        match self {
            Self::Create { name, .. } | Self::Set { name, .. } | Self::Add { name, .. }
            | Self::Subtract { name, .. } | Self::Unset { name } | Self::SetProperty { name, .. } => name,
        }
    }

    pub fn render(&self, manager: &str) -> String {
        match self {
            Self::Create { name, value, local, checker } => {
                let line = with_values(format!("{manager} create {}", quote_token(name)), value.items());
                let list = Value::Bool(value.is_list());
                let line = format!("{line} -list {list} -checker {}", quote_token(checker));
                if *local { line } else { format!("{line} -local_param False") }
            }
            Self::Set { name, value } => with_values(format!("{manager} set {}", quote_token(name)), value.items()),
            Self::Add { name, values } => with_values(format!("{manager} add {}", quote_token(name)), values),
            Self::Subtract { name, values } => with_values(format!("{manager} subtract {}", quote_token(name)), values),
            Self::Unset { name } => format!("{manager} unset {} -start_with_local False -explore_other_scope False", quote_token(name)),
            Self::SetProperty { name, property, value } => {
                format!("{manager} properties set {} {property} {}", quote_token(name), value.to_token())
            }
        }
    }
}

/// What one loader contributes to a replay script: the addons that must be
/// loaded first and the instructions for one manager.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScriptFragment {
    pub addons: BTreeSet<String>,
    pub manager: Option<ParameterKind>,
    pub instructions: Vec<Instruction>,
}

impl ScriptFragment {
    pub fn for_manager(kind: ParameterKind) -> Self { Self { manager: Some(kind), ..Self::default() } }

    pub fn is_empty(&self) -> bool { self.addons.is_empty() && self.instructions.is_empty() }

    pub fn lines(&self) -> Vec<String> {
        let manager = self.manager.map(|k| k.manager_name()).unwrap_or("parameter");
        self.instructions.iter().map(|i| i.render(manager)).collect()
    }
}

/// Join fragments: a sorted, de-duplicated `addon load` block, then one
/// section per manager in [`ParameterKind::ALL`] order.
pub fn assemble<'a>(fragments: impl IntoIterator<Item = &'a ScriptFragment>) -> String {
    let fragments: Vec<&ScriptFragment> = fragments.into_iter().collect();
    let addons: BTreeSet<&str> = fragments.iter().flat_map(|f| f.addons.iter().map(String::as_str)).collect();
    let mut blocks: Vec<Vec<String>> = vec![];
    if !addons.is_empty() {
        blocks.push(addons.iter().map(|a| format!("addon load {}", quote_token(a))).collect());
    }
    for kind in ParameterKind::ALL {
        let section: Vec<String> = fragments.iter()
            .filter(|f| f.manager == Some(kind))
            .flat_map(|f| f.lines())
            .collect();
        if !section.is_empty() { blocks.push(section); }
    }
    let mut out = blocks.into_iter().map(|b| b.join("\n")).collect::<Vec<_>>().join("\n\n");
    if !out.is_empty() { out.push('\n'); }
    out
}
