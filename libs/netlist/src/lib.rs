//! SPICE-like netlist reading and writing for the floorgen flow.
//!
//! Supports the subset of SPICE that ALIGN consumes: `.SUBCKT`/`.ENDS`
//! blocks, MOS device lines (`M`-prefixed), subcircuit instance lines
//! (`X`-prefixed), `*` comments, and `+` line continuations.

pub mod parser;
pub mod writer;


use std::collections::HashSet;

use indexmap::IndexMap;

pub use parser::{ParsedNetlist, Parser, ParserError, Substr};

/// The channel type of a MOS device.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MosKind {
    /// An n-channel device (`nmos`/`nfet` models).
    Nmos,
    /// A p-channel device (`pmos`/`pfet` models).
    Pmos,
}

impl MosKind {
    /// Infers the channel type from a model name.
    ///
    /// Returns [`None`] if the model name identifies neither an NMOS nor a
    /// PMOS device.
    pub fn from_model(model: &str) -> Option<Self> {
        let model = model.to_lowercase();
        if model.contains("pmos") || model.contains("pfet") {
            Some(MosKind::Pmos)
        } else if model.contains("nmos") || model.contains("nfet") {
            Some(MosKind::Nmos)
        } else {
            None
        }
    }
}

impl std::fmt::Display for MosKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MosKind::Nmos => write!(f, "NMOS"),
            MosKind::Pmos => write!(f, "PMOS"),
        }
    }
}

/// A MOS device instance.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Mos {
    /// The instance name.
    pub name: Substr,
    /// The drain net.
    pub d: Substr,
    /// The gate net.
    pub g: Substr,
    /// The source net.
    pub s: Substr,
    /// The body net, if the netlist provided one.
    pub b: Option<Substr>,
    /// The model name.
    pub model: Substr,
    /// The channel type, inferred from the model name at parse time.
    pub kind: MosKind,
    /// Size parameters (`w`, `l`, `nf`, `m`, ...).
    pub params: Params,
}

impl Mos {
    /// The terminal nets in declaration order (drain, gate, source, body).
    pub fn terminals(&self) -> Vec<&Substr> {
        let mut t = vec![&self.d, &self.g, &self.s];
        if let Some(ref b) = self.b {
            t.push(b);
        }
        t
    }
}

/// An instance of a subcircuit (an `X` line).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Instance {
    /// The instance name.
    pub name: Substr,
    /// The connected nets, in port order.
    pub ports: Vec<Substr>,
    /// The name of the instantiated subcircuit.
    pub child: Substr,
    /// Instance parameters.
    pub params: Params,
}

/// A netlist component.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Component {
    /// A MOS device.
    Mos(Mos),
    /// A subcircuit instance.
    Instance(Instance),
}

/// The contents of a `.SUBCKT` block.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct Subckt {
    /// The subcircuit name.
    pub name: Substr,
    /// The subcircuit's ports.
    pub ports: Vec<Substr>,
    /// The components declared inside the block, in declaration order.
    pub components: Vec<Component>,
}

/// An element of a parsed netlist.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Elem {
    /// A subcircuit definition.
    Subckt(Subckt),
    /// A component declared outside any subcircuit.
    Component(Component),
}

/// A parsed netlist.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct Ast {
    /// The netlist elements, in declaration order.
    pub elems: Vec<Elem>,
}

impl Ast {
    /// An iterator over all MOS devices, in declaration order.
    pub fn devices(&self) -> impl Iterator<Item = &Mos> {
        self.elems.iter().flat_map(|elem| {
            let components = match elem {
                Elem::Subckt(s) => s.components.as_slice(),
                Elem::Component(c) => std::slice::from_ref(c),
            };
            components.iter().filter_map(|c| match c {
                Component::Mos(m) => Some(m),
                Component::Instance(_) => None,
            })
        })
    }

    /// The number of MOS devices in the netlist.
    pub fn device_count(&self) -> usize {
        self.devices().count()
    }

    /// The set of device instance names as ALIGN sees them after import.
    ///
    /// ALIGN renames each flattened transistor `M<i>` to `X_M<I>`, so a
    /// constraint must reference `X_MN0` for a device declared `mn0`.
    pub fn align_instance_names(&self) -> HashSet<String> {
        self.devices()
            .map(|m| format!("X_{}", m.name.to_uppercase()))
            .collect()
    }
}

/// Reference device dimensions known to work with the ALIGN sky130 PDK.
///
/// ALIGN derives pseudo-fin counts from `w`/`l`/`nf`, and arbitrary model-
/// generated sizes routinely land outside the range its primitive generator
/// accepts. Forcing every device to the dimensions used by the ALIGN sky130
/// golden examples sidesteps that arithmetic entirely. This is a workaround,
/// not real sizing.
pub mod reference_sizing {
    use super::{Ast, Component, Elem, Mos, MosKind, Substr};

    /// Golden PMOS sizing: `pmos_rvt w=21e-7 l=150e-9 nf=10 m=1`.
    pub const PMOS_MODEL: &str = "pmos_rvt";
    /// Golden NMOS sizing: `nmos_rvt w=10.5e-7 l=150e-9 nf=10 m=1`.
    pub const NMOS_MODEL: &str = "nmos_rvt";

    const PMOS_WIDTH: &str = "21e-7";
    const NMOS_WIDTH: &str = "10.5e-7";
    const LENGTH: &str = "150e-9";
    const FINGERS: &str = "10";
    const MULT: &str = "1";

    /// Rewrites every MOS device in `ast` to the golden reference sizing.
    ///
    /// Devices missing a body terminal are padded with `VDD` (PMOS) or
    /// `VSS` (NMOS).
    pub fn apply(ast: &mut Ast) {
        for elem in ast.elems.iter_mut() {
            match elem {
                Elem::Subckt(s) => {
                    for c in s.components.iter_mut() {
                        if let Component::Mos(m) = c {
                            apply_mos(m);
                        }
                    }
                }
                Elem::Component(Component::Mos(m)) => apply_mos(m),
                Elem::Component(Component::Instance(_)) => {}
            }
        }
    }

    fn apply_mos(m: &mut Mos) {
        if m.b.is_none() {
            m.b = Some(Substr::from(match m.kind {
                MosKind::Pmos => "VDD",
                MosKind::Nmos => "VSS",
            }));
        }
        m.model = Substr::from(match m.kind {
            MosKind::Pmos => PMOS_MODEL,
            MosKind::Nmos => NMOS_MODEL,
        });
        m.params = super::Params::default();
        m.params.insert(
            "w",
            match m.kind {
                MosKind::Pmos => PMOS_WIDTH,
                MosKind::Nmos => NMOS_WIDTH,
            },
        );
        m.params.insert("l", LENGTH);
        m.params.insert("nf", FINGERS);
        m.params.insert("m", MULT);
    }
}

/// Parameter values, in declaration order.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct Params {
    values: IndexMap<Substr, Substr>,
}

impl Params {
    /// Creates a new, empty parameter set.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a key-value pair, replacing any existing value for the key.
    pub fn insert(&mut self, k: impl Into<Substr>, v: impl Into<Substr>) {
        self.values.insert(k.into(), v.into());
    }

    /// Gets the value corresponding to the given key.
    pub fn get(&self, k: &str) -> Option<&Substr> {
        self.values.get(k)
    }

    /// An iterator over all key-value pairs, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Substr, &Substr)> {
        self.values.iter()
    }

    /// The number of parameters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the parameter set is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<Substr>, V: Into<Substr>> FromIterator<(K, V)> for Params {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
