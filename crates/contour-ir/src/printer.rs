//! S-expression printer for trees
//!
//! Variables print as `name#id` so distinct entities with the same name
//! stay distinguishable in lowered output.

use contour_types::VarId;
use std::fmt::Write;

use crate::ir::*;

/// Render the unit's root function
pub fn print_unit(unit: &Unit) -> String {
    let mut printer = Printer::new(unit);
    printer.function(&unit.root);
    printer.out
}

/// Render a single node
pub fn print_node(unit: &Unit, node: &Node) -> String {
    let mut printer = Printer::new(unit);
    printer.node(node);
    printer.out
}

struct Printer<'a> {
    unit: &'a Unit,
    out: String,
    indent: usize,
}

impl<'a> Printer<'a> {
    fn new(unit: &'a Unit) -> Self {
        Self {
            unit,
            out: String::new(),
            indent: 0,
        }
    }

    fn var(&mut self, id: VarId) {
        let _ = write!(self.out, "{}#{}", self.unit.var_name(id), id);
    }

    fn newline(&mut self) {
        self.out.push('\n');
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
    }

    fn body(&mut self, body: &[Node]) {
        self.indent += 1;
        for node in body {
            self.newline();
            self.node(node);
        }
        self.indent -= 1;
    }

    fn inline(&mut self, nodes: &[Node]) {
        for node in nodes {
            self.out.push(' ');
            self.node(node);
        }
    }

    fn function(&mut self, def: &FunctionDef) {
        self.out.push_str("(lambda");
        if let Some(name) = &def.name {
            let _ = write!(self.out, " {}", name);
        }
        self.out.push_str(" (");
        let mut first = true;
        if let Some(env) = def.props.env_param {
            self.var(env);
            first = false;
        }
        for param in def.params.iter() {
            if !first {
                self.out.push(' ');
            }
            first = false;
            if param.special {
                self.out.push('*');
            }
            self.var(param.var);
        }
        self.out.push(')');
        if def.props.bounded {
            self.out.push_str(" :bounded");
        }
        self.body(&def.body);
        self.out.push(')');
    }

    fn node(&mut self, node: &Node) {
        match node {
            Node::Literal(lit) => {
                let _ = write!(self.out, "{}", lit);
            }
            Node::VarRef(var) => self.var(*var),
            Node::SetVar { var, value } => {
                self.out.push_str("(setq ");
                self.var(*var);
                self.out.push(' ');
                self.node(value);
                self.out.push(')');
            }
            Node::If {
                test,
                then,
                otherwise,
            } => {
                self.out.push_str("(if ");
                self.node(test);
                self.body(std::slice::from_ref(then));
                self.body(std::slice::from_ref(otherwise));
                self.out.push(')');
            }
            Node::Call { callee, args } => {
                self.out.push('(');
                match callee {
                    Callee::Named(name) => self.out.push_str(name),
                    Callee::Primitive(op) => self.out.push_str(op.name()),
                    Callee::Expr(expr) => self.node(expr),
                }
                self.inline(args);
                self.out.push(')');
            }
            Node::Progn(body) => {
                self.out.push_str("(progn");
                self.body(body);
                self.out.push(')');
            }
            Node::Let { bindings, body } => {
                self.out.push_str("(let (");
                for (i, binding) in bindings.iter().enumerate() {
                    if i > 0 {
                        self.out.push(' ');
                    }
                    self.out.push('(');
                    self.var(binding.var);
                    self.out.push(' ');
                    self.node(&binding.init);
                    self.out.push(')');
                }
                self.out.push(')');
                self.body(body);
                self.out.push(')');
            }
            Node::Function(def) => self.function(def),
            Node::Tagbody { tag, segments } => {
                self.out.push_str("(tagbody ");
                self.var(*tag);
                self.indent += 1;
                for segment in segments {
                    if let Some(label) = &segment.label {
                        self.newline();
                        let _ = write!(self.out, "{}:", label);
                    }
                    self.body(&segment.body);
                }
                self.indent -= 1;
                self.out.push(')');
            }
            Node::Go { tag, label, via } => {
                let _ = write!(self.out, "(go {} ", label);
                self.var(*tag);
                if let Some(via) = via {
                    self.out.push_str(" :via ");
                    self.node(via);
                }
                self.out.push(')');
            }
            Node::Block { tag, body } => {
                self.out.push_str("(block ");
                self.var(*tag);
                self.body(body);
                self.out.push(')');
            }
            Node::ReturnFrom { tag, value, via } => {
                self.out.push_str("(return-from ");
                self.var(*tag);
                self.out.push(' ');
                self.node(value);
                if let Some(via) = via {
                    self.out.push_str(" :via ");
                    self.node(via);
                }
                self.out.push(')');
            }
            Node::MultipleValueBind { vars, value, body } => {
                self.out.push_str("(multiple-value-bind (");
                for (i, var) in vars.iter().enumerate() {
                    if i > 0 {
                        self.out.push(' ');
                    }
                    self.var(*var);
                }
                self.out.push_str(") ");
                self.node(value);
                self.body(body);
                self.out.push(')');
            }
            Node::MultipleValueProg1 { first, rest } => {
                self.out.push_str("(multiple-value-prog1 ");
                self.node(first);
                self.body(rest);
                self.out.push(')');
            }
            Node::The { ty, value } => {
                let _ = write!(self.out, "(the {} ", ty);
                self.node(value);
                self.out.push(')');
            }
            Node::UnwindProtect { protected, cleanup } => {
                self.out.push_str("(unwind-protect");
                self.body(std::slice::from_ref(protected));
                self.body(std::slice::from_ref(cleanup));
                self.out.push(')');
            }
            Node::Case {
                key,
                clauses,
                default,
            } => {
                self.out.push_str("(case ");
                self.node(key);
                self.indent += 1;
                for clause in clauses {
                    self.newline();
                    self.out.push_str("((");
                    for (i, lit) in clause.keys.iter().enumerate() {
                        if i > 0 {
                            self.out.push(' ');
                        }
                        let _ = write!(self.out, "{}", lit);
                    }
                    self.out.push(')');
                    self.body(&clause.body);
                    self.out.push(')');
                }
                if !default.is_empty() {
                    self.newline();
                    self.out.push_str("(otherwise");
                    self.body(default);
                    self.out.push(')');
                }
                self.indent -= 1;
                self.out.push(')');
            }
            Node::ExitMarker(tag) => {
                self.out.push_str("(%exit-point ");
                self.var(*tag);
                self.out.push(')');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::UnitBuilder;

    #[test]
    fn test_print_simple_function() {
        let mut b = UnitBuilder::new("print");
        let top = b.function_scope("top", None);
        let x = b.var("x", top);
        let root = FunctionDef::new(
            top,
            ParamList::required([x]),
            vec![Node::call("add", vec![Node::VarRef(x), Node::int(1)])],
        )
        .named("inc");
        let unit = b.finish(root);
        assert_eq!(print_unit(&unit), "(lambda inc (x#0)\n  (add x#0 1))");
    }

    #[test]
    fn test_print_primitive() {
        let mut b = UnitBuilder::new("print");
        let top = b.function_scope("top", None);
        let env = b.var("env", top);
        let unit = b.finish(FunctionDef::new(top, ParamList::default(), Vec::new()));
        let load = Node::env_ref(Node::VarRef(env), 2);
        assert_eq!(print_node(&unit, &load), "(%env-ref env#0 2)");
    }
}
