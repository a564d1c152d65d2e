//! Netlist serialization.

use std::io::{Result, Write};

use itertools::Itertools;

use crate::{Ast, Component, Elem, Instance, Mos, Subckt};

/// Writes the netlist to the given output stream.
///
/// Components are written in declaration order, so a parse followed by a
/// write preserves device ordering.
pub fn write_netlist<W: Write>(ast: &Ast, out: &mut W) -> Result<()> {
    for (i, elem) in ast.elems.iter().enumerate() {
        if i > 0 {
            writeln!(out)?;
        }
        match elem {
            Elem::Subckt(s) => write_subckt(s, out)?,
            Elem::Component(c) => write_component(c, out)?,
        }
    }
    Ok(())
}

/// Renders the netlist to a string.
pub fn netlist_to_string(ast: &Ast) -> String {
    let mut buf = Vec::new();
    // Writing to a Vec<u8> cannot fail, and all tokens originate from str.
    write_netlist(ast, &mut buf).unwrap();
    String::from_utf8(buf).unwrap()
}

fn write_subckt<W: Write>(subckt: &Subckt, out: &mut W) -> Result<()> {
    writeln!(
        out,
        ".subckt {} {}",
        subckt.name,
        subckt.ports.iter().join(" ")
    )?;
    for c in subckt.components.iter() {
        write_component(c, out)?;
    }
    writeln!(out, ".ends {}", subckt.name)
}

fn write_component<W: Write>(component: &Component, out: &mut W) -> Result<()> {
    match component {
        Component::Mos(m) => write_mos(m, out),
        Component::Instance(inst) => write_instance(inst, out),
    }
}

fn write_mos<W: Write>(m: &Mos, out: &mut W) -> Result<()> {
    write!(out, "{}", m.name)?;
    for t in m.terminals() {
        write!(out, " {t}")?;
    }
    write!(out, " {}", m.model)?;
    for (k, v) in m.params.iter() {
        write!(out, " {k}={v}")?;
    }
    writeln!(out)
}

fn write_instance<W: Write>(inst: &Instance, out: &mut W) -> Result<()> {
    write!(out, "{}", inst.name)?;
    for p in inst.ports.iter() {
        write!(out, " {p}")?;
    }
    write!(out, " {}", inst.child)?;
    for (k, v) in inst.params.iter() {
        write!(out, " {k}={v}")?;
    }
    writeln!(out)
}
