//! AST-based rewriting of JavaScript module specifiers.
//!
//! Parses the source as an ES module, rewrites every static and dynamic
//! import/export source string, and serializes the mutated tree back to
//! source. Absolute URLs pass through untouched; relative paths get a
//! `?module` marker; bare package names become gateway URLs versioned
//! from the package's dependency map.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    ExportAllDeclaration, ExportNamedDeclaration, Expression, ImportDeclaration,
    ImportExpression, StringLiteral,
};
use oxc_ast::VisitMut;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_parser::Parser;
use oxc_span::{Atom, SourceType};
use regex::Regex;
use tracing::warn;

use tarmac_core::{GatewayError, GatewayResult};

/// `{package-name}{/subpath}` split for bare specifiers
static BARE_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^((?:@[^/]+/)?[^/]+)(/.*)?$").unwrap());

/// Rewrite all module specifiers in `code`.
///
/// `file` only labels the error when the source does not parse.
pub fn rewrite_module(
    origin: &str,
    dependencies: &HashMap<String, String>,
    code: &str,
    file: &str,
) -> GatewayResult<String> {
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(true);
    let parsed = Parser::new(&allocator, code, source_type).parse();

    if parsed.panicked || !parsed.errors.is_empty() {
        let diagnostics = parsed
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        return Err(GatewayError::Transform {
            file: file.to_string(),
            message: "source is not a valid module".to_string(),
            diagnostics,
        });
    }

    let mut program = parsed.program;
    let mut rewriter = SpecifierRewriter {
        origin,
        dependencies,
    };
    rewriter.visit_program(&mut program);

    Ok(Codegen::<false>::new(code.len(), CodegenOptions::default()).build(&program))
}

struct SpecifierRewriter<'r> {
    origin: &'r str,
    dependencies: &'r HashMap<String, String>,
}

impl SpecifierRewriter<'_> {
    fn rewrite_source(&self, literal: &mut StringLiteral) {
        if let Some(rewritten) = rewrite_specifier(self.origin, self.dependencies, &literal.value) {
            literal.value = Atom::from(rewritten);
        }
    }
}

impl<'a> VisitMut<'a> for SpecifierRewriter<'_> {
    fn visit_import_declaration(&mut self, decl: &mut ImportDeclaration<'a>) {
        self.rewrite_source(&mut decl.source);
    }

    fn visit_export_all_declaration(&mut self, decl: &mut ExportAllDeclaration<'a>) {
        self.rewrite_source(&mut decl.source);
    }

    fn visit_export_named_declaration(&mut self, decl: &mut ExportNamedDeclaration<'a>) {
        // Only re-exports carry a source; plain `export { name }` and
        // exported declarations do not.
        if let Some(source) = &mut decl.source {
            self.rewrite_source(source);
        }
        if let Some(declaration) = &mut decl.declaration {
            self.visit_declaration(declaration);
        }
    }

    fn visit_import_expression(&mut self, expr: &mut ImportExpression<'a>) {
        if let Expression::StringLiteral(literal) = &mut expr.source {
            self.rewrite_source(literal);
        } else {
            self.visit_expression(&mut expr.source);
        }
        for argument in expr.arguments.iter_mut() {
            self.visit_expression(argument);
        }
    }
}

/// Compute the rewritten form of one specifier, or `None` to leave it
/// alone.
fn rewrite_specifier(
    origin: &str,
    dependencies: &HashMap<String, String>,
    value: &str,
) -> Option<String> {
    if is_absolute_url(value) {
        return None;
    }

    if is_bare_identifier(value) {
        let caps = BARE_IDENTIFIER.captures(value)?;
        let package_name = caps.get(1)?.as_str();
        let subpath = caps.get(2).map(|m| m.as_str()).unwrap_or("");

        let version = match dependencies.get(package_name) {
            Some(version) => version.as_str(),
            None => {
                warn!(
                    package = package_name,
                    "missing version info in dependencies; falling back to \"latest\""
                );
                "latest"
            }
        };

        Some(format!("{origin}/{package_name}@{version}{subpath}?module"))
    } else {
        // Relative path: keep serving it in module mode.
        Some(format!("{value}?module"))
    }
}

fn is_absolute_url(value: &str) -> bool {
    value.starts_with("//") || url::Url::parse(value).is_ok()
}

fn is_bare_identifier(value: &str) -> bool {
    !value.starts_with('.') && !value.starts_with('/')
}
