//! Generated test module emission

use std::fmt::Write as _;

use serde::Serialize;

use crate::snapshot::SnapshotOptions;

/// Per-test timeout handed to the test runner. Fixtures with a deferred
/// paint run close to this budget.
pub const TEST_TIMEOUT_MS: u64 = 8000;

/// Wait before the first frame for fixtures that need a settle pass
pub const SETTLE_DELAY_MS: u64 = 1000;

/// How the single test case is registered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Normal,
    Exclusive,
    Skip,
}

impl ExecutionMode {
    /// Registration function in the runtime test API
    pub fn register_fn(self) -> &'static str {
        match self {
            ExecutionMode::Normal => "it",
            ExecutionMode::Exclusive => "fit",
            ExecutionMode::Skip => "xit",
        }
    }
}

/// Everything the emitter needs for one fixture
#[derive(Debug)]
pub struct ModuleSpec<'a> {
    /// Fixture path relative to the test root, forward slashes
    pub name: &'a str,
    pub markup: &'a str,
    pub scripts: &'a [String],
    pub mode: ExecutionMode,
    pub options: &'a SnapshotOptions,
    pub parse_binding: &'a str,
}

/// Escape for a single-quoted JS string literal
pub fn escape_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out
}

/// Render the module text
pub fn emit_module(spec: &ModuleSpec<'_>) -> String {
    let name = escape_literal(spec.name);
    let has_scripts = !spec.scripts.is_empty();
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "describe('html-{name}', () => {{");
    let _ = writeln!(
        out,
        "  const html_parse = () => {}('{}');",
        spec.parse_binding,
        escape_literal(spec.markup)
    );
    let _ = writeln!(out, "  let index = 0;");
    let _ = writeln!(out, "  const snapshotAction = async () => {{");
    if has_scripts {
        let _ = writeln!(
            out,
            "    await snapshot({}, '{name}', index.toString());",
            spec.options.target.expression()
        );
        let _ = writeln!(out, "    index++;");
    } else {
        let _ = writeln!(
            out,
            "    await snapshot({}, '{name}', null);",
            spec.options.target.expression()
        );
    }
    let _ = writeln!(out, "  }};");

    let _ = writeln!(out, "  {}('should work', async (done) => {{", spec.mode.register_fn());
    let _ = writeln!(out, "    html_parse();");
    if spec.options.settle_delay {
        let _ = writeln!(out, "    await sleep({SETTLE_DELAY_MS});");
    }
    let _ = writeln!(out, "    requestAnimationFrame(async () => {{");
    if has_scripts {
        // Payloads are emitted verbatim
        for script in spec.scripts {
            out.push_str(script);
            if !script.ends_with('\n') {
                out.push('\n');
            }
        }
    } else {
        let _ = writeln!(out, "      await snapshotAction();");
    }
    let _ = writeln!(out, "      done();");
    let _ = writeln!(out, "    }});");
    let _ = writeln!(out, "  }}, {TEST_TIMEOUT_MS});");
    let _ = writeln!(out, "}});");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotTarget;

    fn spec<'a>(scripts: &'a [String], options: &'a SnapshotOptions) -> ModuleSpec<'a> {
        ModuleSpec {
            name: "css/a.html",
            markup: "<p class=\"x\">it's\n</p>",
            scripts,
            mode: ExecutionMode::Normal,
            options,
            parse_binding: "__parse_html__",
        }
    }

    #[test]
    fn escapes_quotes_backslashes_and_newlines() {
        assert_eq!(escape_literal("a'b\"c\\d\r\ne"), "a\\'b\\\"c\\\\d\\r\\ne");
    }

    #[test]
    fn no_scripts_takes_one_unnumbered_capture() {
        let options = SnapshotOptions::default();
        let module = emit_module(&spec(&[], &options));
        assert!(module.starts_with("describe('html-css/a.html'"));
        assert!(module.contains("__parse_html__('<p class=\\\"x\\\">it\\'s\\n</p>')"));
        assert!(module.contains("await snapshot(null, 'css/a.html', null);"));
        assert!(!module.contains("index++"));
        assert_eq!(module.matches("await snapshotAction();").count(), 1);
        assert!(module.contains("  it('should work'"));
        assert!(module.contains("}, 8000);"));
        assert!(!module.contains("sleep("));
    }

    #[test]
    fn scripts_replay_in_order_with_numbered_captures() {
        let scripts = vec![
            "first(); await snapshotAction();".to_string(),
            "second(); await snapshotAction();".to_string(),
        ];
        let options = SnapshotOptions {
            target: SnapshotTarget::body(),
            settle_delay: true,
        };
        let mut module_spec = spec(&scripts, &options);
        module_spec.mode = ExecutionMode::Exclusive;
        let module = emit_module(&module_spec);

        let first = module.find("first();").unwrap();
        let second = module.find("second();").unwrap();
        assert!(first < second);
        assert!(module.contains("await snapshot(document.body, 'css/a.html', index.toString());"));
        assert!(module.contains("index++;"));
        assert!(module.contains("fit('should work'"));

        let sleep = module.find("await sleep(1000);").unwrap();
        let frame = module.find("requestAnimationFrame").unwrap();
        assert!(sleep < frame);
    }

    #[test]
    fn multi_line_payloads_are_emitted_verbatim() {
        let payload = "const s = `a\nb`;\n  console.log(s);\nawait snapshotAction();";
        let scripts = vec![payload.to_string()];
        let options = SnapshotOptions::default();
        let module = emit_module(&spec(&scripts, &options));

        assert!(module.contains(&format!("{payload}\n      done();")));
        assert!(module.contains("const s = `a\nb`;"));
    }
}
