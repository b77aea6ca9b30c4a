//! Assembly of the single C source file handed to the toolchain.
//!
//! Layout: configuration macros, symbol and string tables, the runtime
//! prelude, forward declarations, one function per method/block body, the
//! top-level function, `main`.

use std::fmt::Write as _;

const RUNTIME: &str = include_str!("runtime.c");

pub const MAIN_FUNCTION: &str = "cinder_main";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// The program's top level.
    Main,
    Method,
    Block,
}

/// One generated C function.
#[derive(Debug, Clone)]
pub struct CFunction {
    pub name: String,
    pub kind: FunctionKind,
    /// Number of variables declared by the body's scope.
    pub env_size: usize,
    pub body: Vec<String>,
}

impl CFunction {
    pub fn signature(&self) -> String {
        match self.kind {
            FunctionKind::Main | FunctionKind::Method => format!(
                "static Value {}(Value self, int argc, Value *args, Closure *blk)",
                self.name
            ),
            FunctionKind::Block => format!(
                "static Value {}(Closure *closure, int argc, Value *args)",
                self.name
            ),
        }
    }

    fn render(&self, out: &mut String) {
        out.push_str(&self.signature());
        out.push_str(" {\n");
        match self.kind {
            FunctionKind::Main | FunctionKind::Method => {
                let _ = writeln!(out, "    Env *env = rt_env_new(NULL, {});", self.env_size);
            }
            FunctionKind::Block => {
                out.push_str("    Value self = closure->self;\n");
                out.push_str("    Closure *blk = closure->blk;\n");
                let _ = writeln!(
                    out,
                    "    Env *env = rt_env_new(closure->env, {});",
                    self.env_size
                );
            }
        }
        out.push_str("    (void)self; (void)argc; (void)args; (void)blk; (void)env;\n");
        for line in &self.body {
            let _ = writeln!(out, "    {}", line);
        }
        out.push_str("}\n");
    }
}

#[derive(Debug, Clone)]
pub struct TranslationUnit {
    pub max_call_depth: usize,
    pub echo_result: bool,
    /// Symbols, method names and global names, by index.
    pub symbols: Vec<String>,
    pub strings: Vec<String>,
    /// Method and block bodies in definition order.
    pub functions: Vec<CFunction>,
    pub main: CFunction,
}

impl TranslationUnit {
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(RUNTIME.len() + 4096);

        out.push_str("/* generated by cinder */\n");
        let _ = writeln!(out, "#define RT_MAX_CALL_DEPTH {}", self.max_call_depth);
        let _ = writeln!(out, "#define RT_ECHO_RESULT {}", u8::from(self.echo_result));
        let _ = writeln!(out, "#define RT_SYM_COUNT {}", self.symbols.len());
        let _ = writeln!(out, "#define RT_STR_COUNT {}", self.strings.len());
        out.push('\n');

        out.push_str("#include <stddef.h>\n");
        out.push_str("static const char *const rt_sym_names[] = {");
        for symbol in &self.symbols {
            let _ = write!(out, " {},", c_string_literal(symbol));
        }
        out.push_str(" NULL };\n");
        out.push_str("static const char *const rt_str_data[] = {");
        for string in &self.strings {
            let _ = write!(out, " {},", c_string_literal(string));
        }
        out.push_str(" NULL };\n");
        out.push_str("static const size_t rt_str_lens[] = {");
        for string in &self.strings {
            let _ = write!(out, " {},", string.len());
        }
        out.push_str(" 0 };\n\n");

        out.push_str(RUNTIME);
        out.push('\n');

        for function in self.functions.iter().chain(std::iter::once(&self.main)) {
            let _ = writeln!(out, "{};", function.signature());
        }
        out.push('\n');

        for function in self.functions.iter().chain(std::iter::once(&self.main)) {
            function.render(&mut out);
            out.push('\n');
        }

        out.push_str("int main(void) {\n");
        out.push_str("    rt_init();\n");
        let _ = writeln!(
            out,
            "    rt_finish({}(rt_main_object(), 0, NULL, NULL));",
            self.main.name
        );
        out.push_str("    return 0;\n");
        out.push_str("}\n");
        out
    }
}

/// C string literal with the same bytes as `s`. Non-printable and
/// non-ASCII bytes use three-digit octal escapes, which cannot run into a
/// following digit.
pub fn c_string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for byte in s.bytes() {
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            // `??` could start a trigraph
            b'?' => out.push_str("\\?"),
            0x20..=0x7e => out.push(byte as char),
            other => {
                let _ = write!(out, "\\{:03o}", other);
            }
        }
    }
    out.push('"');
    out
}

/// C identifier fragment for a method name (`empty?` -> `empty_`).
pub fn mangle(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn function(kind: FunctionKind) -> CFunction {
        CFunction {
            name: "f".to_string(),
            kind,
            env_size: 2,
            body: vec!["return rt_nil();".to_string()],
        }
    }

    #[test]
    fn test_c_string_literal_escapes() {
        assert_eq!(c_string_literal("a\"b\\c\n"), "\"a\\\"b\\\\c\\n\"");
        assert_eq!(c_string_literal("é"), "\"\\303\\251\"");
        assert_eq!(c_string_literal("\u{1}2"), "\"\\0012\"");
    }

    #[test]
    fn test_mangle() {
        assert_eq!(mangle("nil?"), "nil_");
        assert_eq!(mangle("fib"), "fib");
    }

    #[test]
    fn test_block_prologue_reads_closure() {
        let mut out = String::new();
        function(FunctionKind::Block).render(&mut out);
        assert!(out.starts_with("static Value f(Closure *closure, int argc, Value *args) {"));
        assert!(out.contains("Env *env = rt_env_new(closure->env, 2);"));
        assert!(out.contains("Closure *blk = closure->blk;"));
    }

    #[test]
    fn test_method_prologue_has_fresh_env() {
        let mut out = String::new();
        function(FunctionKind::Method).render(&mut out);
        assert!(out.contains("Env *env = rt_env_new(NULL, 2);"));
        assert!(out.trim_end().ends_with("return rt_nil();\n}"));
    }

    #[test]
    fn test_unit_tables_and_entry() {
        let unit = TranslationUnit {
            max_call_depth: 7,
            echo_result: true,
            symbols: vec!["puts".to_string()],
            strings: vec!["hi".to_string()],
            functions: Vec::new(),
            main: CFunction {
                name: MAIN_FUNCTION.to_string(),
                kind: FunctionKind::Main,
                env_size: 0,
                body: vec!["return rt_nil();".to_string()],
            },
        };
        let source = unit.render();
        assert!(source.contains("#define RT_MAX_CALL_DEPTH 7"));
        assert!(source.contains("#define RT_ECHO_RESULT 1"));
        assert!(source.contains("rt_sym_names[] = { \"puts\", NULL };"));
        assert!(source.contains("rt_str_lens[] = { 2, 0 };"));
        assert!(source.contains("rt_finish(cinder_main(rt_main_object(), 0, NULL, NULL));"));
    }
}
