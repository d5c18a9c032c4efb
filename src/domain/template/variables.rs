//! Static discovery of the variables a message template depends on.
//!
//! The message body is parsed into the engine's syntax tree and walked depth
//! first. A name counts the first time it is read while not bound by an
//! enclosing `for`, `set`, `with`, `import`, or macro scope. Names the
//! environment provides as globals (helper functions and builtins), the
//! reserved `Tools` variable, and implicit macro arguments are left out.

use std::collections::HashSet;

use minijinja::machinery::{WhitespaceConfig, ast, parse};
use minijinja::syntax::SyntaxConfig;

use crate::domain::payload::RESERVED_TOOLS;

/// Names bound implicitly inside macro bodies.
const IMPLICIT_NAMES: [&str; 2] = ["varargs", "kwargs"];

/// Variables read by `source`, in first-seen order.
///
/// `globals` are the names the template environment already provides.
pub fn dependent_variables(
    source: &str,
    globals: &HashSet<String>,
) -> Result<Vec<String>, minijinja::Error> {
    let tree = parse(source, "<message>", SyntaxConfig::default(), WhitespaceConfig::default())?;
    let mut walker = Walker::new();
    walker.stmt(&tree);
    Ok(walker
        .found
        .into_iter()
        .filter(|name| !globals.contains(*name) && !is_excluded(name))
        .map(str::to_string)
        .collect())
}

fn is_excluded(name: &str) -> bool {
    name == RESERVED_TOOLS || IMPLICIT_NAMES.contains(&name)
}

struct Walker<'a> {
    found: Vec<&'a str>,
    scopes: Vec<HashSet<&'a str>>,
}

impl<'a> Walker<'a> {
    fn new() -> Self {
        Self { found: Vec::new(), scopes: vec![HashSet::new()] }
    }

    fn is_bound(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn bind(&mut self, name: &'a str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name);
        }
    }

    fn scoped(&mut self, visit: impl FnOnce(&mut Self)) {
        self.scopes.push(HashSet::new());
        visit(self);
        self.scopes.pop();
    }

    /// A read of an unbound name records it once and binds it in the
    /// current scope.
    fn read(&mut self, name: &'a str) {
        if self.is_bound(name) {
            return;
        }
        if !self.found.contains(&name) {
            self.found.push(name);
        }
        self.bind(name);
    }

    fn bind_target(&mut self, target: &ast::Expr<'a>) {
        match target {
            ast::Expr::Var(var) => self.bind(var.id),
            ast::Expr::List(list) => list.items.iter().for_each(|item| self.bind_target(item)),
            _ => {}
        }
    }

    fn stmts(&mut self, body: &[ast::Stmt<'a>]) {
        body.iter().for_each(|stmt| self.stmt(stmt));
    }

    fn stmt(&mut self, stmt: &ast::Stmt<'a>) {
        match stmt {
            ast::Stmt::Template(template) => {
                self.bind("self");
                self.stmts(&template.children);
            }
            ast::Stmt::EmitExpr(emit) => self.expr(&emit.expr),
            ast::Stmt::EmitRaw(_) => {}
            ast::Stmt::ForLoop(for_loop) => {
                self.scoped(|w| {
                    w.bind("loop");
                    w.expr(&for_loop.iter);
                    w.bind_target(&for_loop.target);
                    w.expr_opt(&for_loop.filter_expr);
                    w.stmts(&for_loop.body);
                });
                self.scoped(|w| w.stmts(&for_loop.else_body));
            }
            ast::Stmt::IfCond(cond) => {
                self.expr(&cond.expr);
                self.scoped(|w| w.stmts(&cond.true_body));
                self.scoped(|w| w.stmts(&cond.false_body));
            }
            ast::Stmt::WithBlock(with) => self.scoped(|w| {
                for (target, value) in &with.assignments {
                    w.bind_target(target);
                    w.expr(value);
                }
                w.stmts(&with.body);
            }),
            ast::Stmt::Set(set) => {
                self.bind_target(&set.target);
                self.expr(&set.expr);
            }
            ast::Stmt::SetBlock(set) => {
                self.bind_target(&set.target);
                self.expr_opt(&set.filter);
                self.scoped(|w| w.stmts(&set.body));
            }
            ast::Stmt::AutoEscape(block) => self.scoped(|w| w.stmts(&block.body)),
            ast::Stmt::FilterBlock(block) => {
                self.expr(&block.filter);
                self.scoped(|w| w.stmts(&block.body));
            }
            ast::Stmt::Block(block) => self.scoped(|w| {
                w.bind("super");
                w.stmts(&block.body);
            }),
            ast::Stmt::Import(import) => self.bind_target(&import.name),
            ast::Stmt::FromImport(import) => {
                for (name, alias) in &import.names {
                    self.bind_target(alias.as_ref().unwrap_or(name));
                }
            }
            ast::Stmt::Macro(decl) => {
                self.bind(decl.name);
                self.scoped(|w| w.macro_body(decl));
            }
            ast::Stmt::CallBlock(block) => {
                self.call(&block.call);
                self.scoped(|w| w.macro_body(&block.macro_decl));
            }
            ast::Stmt::Do(stmt) => self.call(&stmt.call),
            // include/extends names are template names; loop controls read nothing
            _ => {}
        }
    }

    fn macro_body(&mut self, decl: &ast::Macro<'a>) {
        self.bind("caller");
        decl.args.iter().for_each(|arg| self.bind_target(arg));
        decl.defaults.iter().for_each(|default| self.expr(default));
        self.stmts(&decl.body);
    }

    fn call(&mut self, call: &ast::Call<'a>) {
        self.expr(&call.expr);
        self.args(&call.args);
    }

    fn args(&mut self, args: &[ast::CallArg<'a>]) {
        for arg in args {
            match arg {
                ast::CallArg::Pos(expr)
                | ast::CallArg::Kwarg(_, expr)
                | ast::CallArg::PosSplat(expr)
                | ast::CallArg::KwargSplat(expr) => self.expr(expr),
            }
        }
    }

    fn expr_opt(&mut self, expr: &Option<ast::Expr<'a>>) {
        if let Some(expr) = expr {
            self.expr(expr);
        }
    }

    fn expr(&mut self, expr: &ast::Expr<'a>) {
        match expr {
            ast::Expr::Var(var) => self.read(var.id),
            ast::Expr::Const(_) => {}
            ast::Expr::Slice(slice) => {
                self.expr(&slice.expr);
                self.expr_opt(&slice.start);
                self.expr_opt(&slice.stop);
                self.expr_opt(&slice.step);
            }
            ast::Expr::UnaryOp(op) => self.expr(&op.expr),
            ast::Expr::BinOp(op) => {
                self.expr(&op.left);
                self.expr(&op.right);
            }
            ast::Expr::Compare(cmp) => {
                self.expr(&cmp.expr);
                cmp.ops.iter().for_each(|op| self.expr(&op.expr));
            }
            ast::Expr::IfExpr(cond) => {
                self.expr(&cond.test_expr);
                self.expr(&cond.true_expr);
                self.expr_opt(&cond.false_expr);
            }
            ast::Expr::Filter(filter) => {
                self.expr_opt(&filter.expr);
                self.args(&filter.args);
            }
            ast::Expr::Test(test) => {
                self.expr(&test.expr);
                self.args(&test.args);
            }
            ast::Expr::GetAttr(attr) => self.expr(&attr.expr),
            ast::Expr::GetItem(item) => {
                self.expr(&item.expr);
                self.expr(&item.subscript_expr);
            }
            ast::Expr::Call(call) => self.call(call),
            ast::Expr::List(list) => list.items.iter().for_each(|item| self.expr(item)),
            ast::Expr::Map(map) => {
                for (key, value) in map.keys.iter().zip(map.values.iter()) {
                    self.expr(key);
                    self.expr(value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(source: &str, globals: &[&str]) -> Vec<String> {
        let globals = globals.iter().map(|n| n.to_string()).collect();
        dependent_variables(source, &globals).unwrap()
    }

    #[test]
    fn orders_by_first_appearance() {
        let vars = deps("{{ b }} and {{ a }} then {{ b }} and {{ c.field }}", &[]);
        assert_eq!(vars, vec!["b", "a", "c"]);
    }

    #[test]
    fn delimiters_inside_string_literals_do_not_reorder() {
        assert_eq!(deps("{{ \"}}\" ~ a }}{{ b }}", &[]), vec!["a", "b"]);
        assert_eq!(deps("{{ \"{{ quoted }}\" }}{{ c }}", &[]), vec!["c"]);
    }

    #[test]
    fn environment_globals_are_not_dependencies() {
        let vars = deps(
            "{{ truncate_chars }}{{ range(3) }}{{ truncate_chars(bio, 10) }}",
            &["truncate_chars", "range"],
        );
        assert_eq!(vars, vec!["bio"]);
    }

    #[test]
    fn called_names_outside_the_environment_are_dependencies() {
        assert_eq!(deps("{{ f(1) }} {{ g }}", &[]), vec!["f", "g"]);
    }

    #[test]
    fn excludes_tools() {
        let vars = deps("{{ render_tools_as_json(Tools) }} {{ bio }}", &["render_tools_as_json"]);
        assert_eq!(vars, vec!["bio"]);
    }

    #[test]
    fn walks_conditionals_and_loops() {
        let source = "{% if show %}{% for item in items %}{{ item }}{{ loop.index }}{% endfor %}{% else %}{{ fallback }}{% endif %}";
        assert_eq!(deps(source, &[]), vec!["show", "items", "fallback"]);
    }

    #[test]
    fn ignores_comments_attributes_filters_and_tests() {
        let source = "{# {{ hidden }} #}{{ user.name | upper }} {{ x is defined }} {{ y | default(z) }}";
        assert_eq!(deps(source, &[]), vec!["user", "x", "y", "z"]);
    }

    #[test]
    fn assignments_and_macros_bind_names() {
        let source = "{% set greeting = \"hi \" ~ name %}{{ greeting }}\
            {% macro tag(label) %}<{{ label }}>{% endmacro %}{{ tag(title) }}";
        assert_eq!(deps(source, &[]), vec!["name", "title"]);
    }

    #[test]
    fn loop_variable_read_after_the_loop_is_a_dependency() {
        let source = "{% for x in xs %}{{ x }}{% endfor %}{{ x }}";
        assert_eq!(deps(source, &[]), vec!["xs", "x"]);
    }

    #[test]
    fn text_outside_tags_does_not_affect_order() {
        assert_eq!(deps("name then {{ other }} {{ name }}", &[]), vec!["other", "name"]);
    }

    #[test]
    fn syntax_errors_are_reported() {
        assert!(dependent_variables("{{ broken", &HashSet::new()).is_err());
    }
}
