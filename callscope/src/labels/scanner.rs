//! syn visitor building a [`FunctionTable`] for one Rust source file.
//!
//! Besides plain closures, it understands the wrapping idiom
//! `interceptor.wrap(target, call_site!())`: the description is keyed by
//! the line of the `call_site!` invocation (the line recorded in traces)
//! and takes its context from where the wrapper ends up, so
//! `let parse = interceptor.wrap(|s| .., call_site!());` labels the site
//! `variable parse`.

use super::{
    read_source, CallContext, FunctionContext, FunctionDescription, FunctionKind, FunctionTable,
};
use crate::domain::LabelError;
use proc_macro2::Span;
use std::collections::HashSet;
use std::path::Path;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::visit::{self, Visit};
use syn::{Expr, ExprClosure, ExprMacro, Lit, Member, Pat, Token};

/// Methods registering an event listener; closures passed to them are handlers
const LISTENER_METHODS: &[&str] = &["on", "once", "add_listener", "add_event_listener", "subscribe"];

/// Methods whose closure argument computes a fallback for the receiver
const DEFAULT_METHODS: &[&str] = &["unwrap_or_else", "or_else", "get_or_insert_with", "or_insert_with"];

const SITE_MACRO: &str = "call_site";

pub fn scan_source(source: &str) -> Result<FunctionTable, syn::Error> {
    let file = syn::parse_file(source)?;
    let mut scanner = Scanner::default();
    scanner.visit_file(&file);
    Ok(scanner.table)
}

pub fn scan_file(path: &Path) -> Result<FunctionTable, LabelError> {
    let source = read_source(path)?;
    scan_source(&source).map_err(|e| LabelError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[derive(Default)]
struct Scanner {
    table: FunctionTable,
    /// Start positions of closures and site macros already described
    claimed: HashSet<(usize, usize)>,
}

fn line_of(span: Span) -> u32 {
    u32::try_from(span.start().line).unwrap_or(u32::MAX)
}

fn position(span: Span) -> (usize, usize) {
    let start = span.start();
    (start.line, start.column)
}

impl Scanner {
    fn declare(&mut self, ident: &syn::Ident, block: &syn::Block) {
        self.table.insert(
            line_of(ident.span()),
            FunctionDescription {
                kind: FunctionKind::Declaration,
                name: Some(ident.to_string()),
                empty: block.stmts.is_empty(),
                context: None,
            },
        );
    }

    fn closure(&mut self, closure: &ExprClosure, context: Option<FunctionContext>) {
        let span = closure.span();
        if !self.claimed.insert(position(span)) {
            return;
        }
        self.table.insert(
            line_of(span),
            FunctionDescription {
                kind: FunctionKind::Expression,
                name: None,
                empty: is_empty_body(&closure.body),
                context,
            },
        );
    }

    /// A closure or a wrapper call appearing in `context`
    fn contextual(&mut self, expr: &Expr, context: FunctionContext) {
        match strip(expr) {
            Expr::Closure(closure) => self.closure(closure, Some(context)),
            Expr::MethodCall(call) => {
                self.wrapped(&call.args, Some(context));
            }
            Expr::Call(call) => {
                self.wrapped(&call.args, Some(context));
            }
            _ => {}
        }
    }

    /// Describe `wrap(target, call_site!())` at the macro's line.
    ///
    /// Returns whether `args` carried a site macro.
    fn wrapped(
        &mut self,
        args: &Punctuated<Expr, Token![,]>,
        context: Option<FunctionContext>,
    ) -> bool {
        let Some(site) = args.iter().find_map(site_macro) else {
            return false;
        };
        let site_span = site.mac.path.span();
        if !self.claimed.insert(position(site_span)) {
            return true;
        }
        let line = line_of(site_span);

        for arg in args {
            match strip(arg) {
                Expr::Closure(closure) => {
                    self.claimed.insert(position(closure.span()));
                    self.table.insert(
                        line,
                        FunctionDescription {
                            kind: FunctionKind::Expression,
                            name: None,
                            empty: is_empty_body(&closure.body),
                            context,
                        },
                    );
                    return true;
                }
                Expr::Path(path) => {
                    if let Some(last) = path.path.segments.last() {
                        self.table.insert(
                            line,
                            FunctionDescription {
                                kind: FunctionKind::Expression,
                                name: Some(last.ident.to_string()),
                                empty: false,
                                context: None,
                            },
                        );
                        return true;
                    }
                }
                _ => {}
            }
        }
        true
    }

    fn callback_args(&mut self, args: &Punctuated<Expr, Token![,]>, callee: &str, handler: bool) {
        let event = if handler {
            args.iter().find_map(string_literal)
        } else {
            None
        };
        for arg in args {
            let context = FunctionContext::Call(CallContext {
                callee: callee.to_string(),
                immediately_called: false,
                handler,
                event: event.clone(),
            });
            // Closures, and wrapped closures passed straight through
            self.contextual(arg, context);
        }
    }
}

impl<'ast> Visit<'ast> for Scanner {
    fn visit_item_fn(&mut self, item: &'ast syn::ItemFn) {
        self.declare(&item.sig.ident, &item.block);
        visit::visit_item_fn(self, item);
    }

    fn visit_impl_item_fn(&mut self, item: &'ast syn::ImplItemFn) {
        self.declare(&item.sig.ident, &item.block);
        visit::visit_impl_item_fn(self, item);
    }

    fn visit_local(&mut self, local: &'ast syn::Local) {
        if let Some(init) = &local.init {
            let name = render_pat(&local.pat);
            self.contextual(&init.expr, FunctionContext::Variable { name });
        }
        visit::visit_local(self, local);
    }

    fn visit_expr_assign(&mut self, assign: &'ast syn::ExprAssign) {
        let target = render(&assign.left);
        self.contextual(&assign.right, FunctionContext::Assignment { target });
        visit::visit_expr_assign(self, assign);
    }

    fn visit_field_value(&mut self, field: &'ast syn::FieldValue) {
        let key = render_member(&field.member);
        self.contextual(&field.expr, FunctionContext::Property { key });
        visit::visit_field_value(self, field);
    }

    fn visit_expr_return(&mut self, ret: &'ast syn::ExprReturn) {
        if let Some(expr) = &ret.expr {
            self.contextual(expr, FunctionContext::ReturnValue);
        }
        visit::visit_expr_return(self, ret);
    }

    fn visit_expr_call(&mut self, call: &'ast syn::ExprCall) {
        if let Expr::Closure(closure) = strip(&call.func) {
            let context = FunctionContext::Call(CallContext {
                callee: "closure".to_string(),
                immediately_called: true,
                handler: false,
                event: None,
            });
            self.closure(closure, Some(context));
        }
        if !self.wrapped(&call.args, None) {
            let handler = last_segment(&call.func)
                .is_some_and(|name| LISTENER_METHODS.contains(&name.as_str()));
            self.callback_args(&call.args, &render(&call.func), handler);
        }
        visit::visit_expr_call(self, call);
    }

    fn visit_expr_method_call(&mut self, call: &'ast syn::ExprMethodCall) {
        if !self.wrapped(&call.args, None) {
            let method = call.method.to_string();
            let receiver = render(&call.receiver);
            if DEFAULT_METHODS.contains(&method.as_str()) {
                for arg in &call.args {
                    if let Expr::Closure(closure) = strip(arg) {
                        let context = FunctionContext::DefaultFor {
                            subject: receiver.clone(),
                        };
                        self.closure(closure, Some(context));
                    }
                }
            } else {
                let handler = LISTENER_METHODS.contains(&method.as_str());
                self.callback_args(&call.args, &format!("{receiver}.{method}"), handler);
            }
        }
        visit::visit_expr_method_call(self, call);
    }

    fn visit_expr_closure(&mut self, closure: &'ast ExprClosure) {
        self.closure(closure, None);
        visit::visit_expr_closure(self, closure);
    }
}

fn strip(mut expr: &Expr) -> &Expr {
    loop {
        expr = match expr {
            Expr::Paren(inner) => &inner.expr,
            Expr::Group(inner) => &inner.expr,
            Expr::Reference(inner) => &inner.expr,
            _ => return expr,
        };
    }
}

fn is_empty_body(body: &Expr) -> bool {
    match strip(body) {
        Expr::Block(block) => block.block.stmts.is_empty(),
        Expr::Tuple(tuple) => tuple.elems.is_empty(),
        _ => false,
    }
}

fn site_macro(arg: &Expr) -> Option<&ExprMacro> {
    match strip(arg) {
        Expr::Macro(mac) if mac.mac.path.segments.last().is_some_and(|s| s.ident == SITE_MACRO) => {
            Some(mac)
        }
        _ => None,
    }
}

fn string_literal(arg: &Expr) -> Option<String> {
    match strip(arg) {
        Expr::Lit(syn::ExprLit {
            lit: Lit::Str(text),
            ..
        }) => Some(text.value()),
        _ => None,
    }
}

fn last_segment(expr: &Expr) -> Option<String> {
    match strip(expr) {
        Expr::Path(path) => path.path.segments.last().map(|s| s.ident.to_string()),
        _ => None,
    }
}

fn render_path(path: &syn::Path) -> String {
    path.segments
        .iter()
        .map(|segment| segment.ident.to_string())
        .collect::<Vec<_>>()
        .join("::")
}

fn render_member(member: &Member) -> String {
    match member {
        Member::Named(ident) => ident.to_string(),
        Member::Unnamed(index) => index.index.to_string(),
    }
}

fn render(expr: &Expr) -> String {
    match strip(expr) {
        Expr::Path(path) => render_path(&path.path),
        Expr::Field(field) => format!("{}.{}", render(&field.base), render_member(&field.member)),
        Expr::MethodCall(call) => format!("{}.{}()", render(&call.receiver), call.method),
        Expr::Call(call) => format!("{}()", render(&call.func)),
        Expr::Index(index) => format!("{}[]", render(&index.expr)),
        Expr::Unary(unary) => render(&unary.expr),
        Expr::Lit(syn::ExprLit {
            lit: Lit::Str(text),
            ..
        }) => text.value(),
        _ => "expression".to_string(),
    }
}

fn render_pat(pat: &Pat) -> String {
    match pat {
        Pat::Ident(ident) => ident.ident.to_string(),
        Pat::Type(typed) => render_pat(&typed.pat),
        Pat::Reference(reference) => render_pat(&reference.pat),
        _ => "binding".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(source: &str) -> FunctionTable {
        scan_source(source).unwrap()
    }

    #[test]
    fn test_declarations() {
        let table = labels("fn load() {}\n\nimpl Store {\n    fn save(&self) { work(); }\n}\n");
        assert_eq!(table.label(1).as_deref(), Some("load"));
        assert_eq!(table.label(4).as_deref(), Some("save"));
    }

    #[test]
    fn test_closure_contexts() {
        let source = "\
fn main() {
    let parse = |s: &str| s.len();
    state.hook = |x| x + 1;
    let cfg = Config { on_done: |r| log(r) };
    let port = opt.unwrap_or_else(|| fallback());
}
fn make() -> impl Fn() {
    return || tick();
}
";
        let table = labels(source);
        assert_eq!(table.label(2).as_deref(), Some("variable parse"));
        assert_eq!(table.label(3).as_deref(), Some("assigned to state.hook"));
        assert_eq!(table.label(4).as_deref(), Some("property on_done"));
        assert_eq!(table.label(5).as_deref(), Some("default for opt"));
        assert_eq!(table.label(8).as_deref(), Some("return value"));
    }

    #[test]
    fn test_property_context() {
        let source = "\
fn build() -> Config {
    Config {
        on_done: |r| log(r),
    }
}
";
        assert_eq!(labels(source).label(3).as_deref(), Some("property on_done"));
    }

    #[test]
    fn test_call_contexts() {
        let source = "\
fn main() {
    items.iter().for_each(|item| consume(item));
    server.on(\"close\", |code| report(code));
    emitter.subscribe(|event| report(event));
    (|| start())();
    spawn(|| {});
}
";
        let table = labels(source);
        assert_eq!(table.label(2).as_deref(), Some("callback for items.iter().for_each"));
        assert_eq!(table.label(3).as_deref(), Some("close handler"));
        assert_eq!(table.label(4).as_deref(), Some("handler"));
        assert_eq!(table.label(5).as_deref(), Some("immediately called"));
        assert_eq!(table.label(6).as_deref(), Some("empty function"));
    }

    #[test]
    fn test_wrapped_closure_keyed_by_site_line() {
        let source = "\
fn main() {
    let checksum = interceptor.wrap(
        |fields: Vec<String>| fields.len(),
        call_site!(),
    );
    let handler = interceptor.wrap(handle_request, call_site!());
}
";
        let table = labels(source);
        assert_eq!(table.label(4).as_deref(), Some("variable checksum"));
        assert!(table.descriptions(3).is_empty());
        assert_eq!(table.label(6).as_deref(), Some("handle_request"));
    }

    #[test]
    fn test_parse_error_is_reported() {
        assert!(scan_source("fn broken( {").is_err());
    }
}
