//! Command-line front end for parsing, merging, and emitting DTS overlays.
//!
//! Reads one or more *ovspecs* (`NAME(,PARAM(=VAL)?)*` or
//! `NAME:PARAM(=VAL)?...`), applies any `dtparam` bindings, composes
//! plugins into a base when one is present, and writes the resulting DTS
//! text to stdout.

use std::path::PathBuf;

use clap::Parser;

use dts_edit::error::{DtsError, DtsResult, Warnings};
use dts_edit::fileio::{FileOpener, GitBranchOpener, LocalFileOpener};
use dts_edit::property::Property;
use dts_edit::token::TokenKind;
use dts_edit::tokenizer::Tokenizer;
use dts_edit::tree::Tree;
use dts_edit::value::Chunk;
use dts_edit::{compose, emit, params};

/// `ovmerge` merges and applies Device Tree Source overlays.
#[derive(Parser, Debug, Clone)]
#[command(name = "ovmerge", version, about, long_about = None)]
struct Args {
    /// Overlay specs: NAME(,PARAM(=VAL)?)* or NAME:PARAM(=VAL)?...
    ovspecs: Vec<String>,

    /// Read sources from this git branch instead of the local filesystem.
    #[arg(short = 'b', value_name = "BRANCH")]
    branch: Option<String>,

    /// Prepend a `// redo: ovmerge ...` reproducibility comment.
    #[arg(short = 'c')]
    redo_comment: bool,

    /// Print the include hierarchy discovered during tokenization and exit.
    #[arg(short = 'i')]
    include_hierarchy: bool,

    /// Apply Raspberry Pi `i2c1` alias extras to the base before composing.
    #[arg(short = 'p')]
    pi_extras: bool,

    /// Replace argv with the first line of stdin (a `// redo: ovmerge ...` line).
    #[arg(short = 'r')]
    replace_argv: bool,

    /// Sort children, properties, and labels on emission.
    #[arg(short = 's')]
    sort: bool,

    /// Trace parser progress to stderr.
    #[arg(short = 't')]
    trace: bool,

    /// Emit warnings to stderr.
    #[arg(short = 'w')]
    warn: bool,
}

fn main() {
    let mut args = Args::parse();

    if args.replace_argv {
        match replace_argv_from_stdin() {
            Ok(new_args) => args = new_args,
            Err(e) => fail(&e.to_string()),
        }
    }

    init_logging(&args);

    if let Err(e) = run(&args) {
        log::error!("{e}");
        eprintln!("ovmerge: {e}");
        std::process::exit(1);
    }
}

fn fail(msg: &str) -> ! {
    eprintln!("ovmerge: {msg}");
    std::process::exit(1);
}

fn init_logging(args: &Args) {
    let level = if args.trace {
        "trace"
    } else if args.warn {
        "warn"
    } else {
        "error"
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).try_init();
}

/// A parsed `NAME(,PARAM(=VAL)?)*` / `NAME:PARAM(=VAL)?...` ovspec.
struct OvSpec {
    name: String,
    params: Vec<(String, Option<String>)>,
    /// True when the ovspec carries at least one parameter, or ends in a
    /// bare trailing comma — the "empty `__overrides__` signal" from
    /// spec.md §6.
    bake_overrides: bool,
}

fn parse_ovspec(spec: &str) -> OvSpec {
    let sep_pos = spec.find([',', ':']);
    let (name, rest) = match sep_pos {
        Some(pos) => (spec[..pos].to_string(), Some(&spec[pos + 1..])),
        None => (spec.to_string(), None),
    };

    let mut params = Vec::new();
    let mut trailing_comma = false;
    if let Some(rest) = rest {
        let parts: Vec<&str> = rest.split(',').collect();
        let last = parts.len().saturating_sub(1);
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() {
                if i == last {
                    trailing_comma = true;
                }
                continue;
            }
            match part.split_once('=') {
                Some((k, v)) => params.push((k.to_string(), Some(v.to_string()))),
                None => params.push((part.to_string(), None)),
            }
        }
    }

    let bake_overrides = !params.is_empty() || trailing_comma;
    OvSpec {
        name,
        params,
        bake_overrides,
    }
}

fn run(args: &Args) -> DtsResult<()> {
    let opener: Box<dyn FileOpener> = match &args.branch {
        Some(b) => Box::new(GitBranchOpener::new(b.clone())),
        None => Box::new(LocalFileOpener::new(vec![PathBuf::from(".")])),
    };

    let specs: Vec<OvSpec> = args.ovspecs.iter().map(|s| parse_ovspec(s)).collect();

    if args.include_hierarchy {
        for spec in &specs {
            print_include_hierarchy(opener.as_ref(), &spec.name)?;
        }
        return Ok(());
    }

    if specs.is_empty() {
        return Err(DtsError::Other("at least one ovspec is required".into()));
    }

    let mut warnings = Warnings::default();
    let mut trees = Vec::with_capacity(specs.len());
    for spec in &specs {
        let (mut tree, w) = dts_edit::load(opener.as_ref(), &spec.name)?;
        warnings.0.extend(w.0);
        for (name, val) in &spec.params {
            params::apply_dtparam(&mut tree, name, val.as_deref())?;
        }
        if spec.bake_overrides {
            if let Some(id) = tree.find_child(tree.root_id(), "__overrides__") {
                tree.delete_node(id);
            }
        }
        trees.push(tree);
    }

    let mut iter = trees.into_iter();
    let mut first = iter.next().expect("checked non-empty above");

    if args.pi_extras {
        apply_pi_extras(&mut first, &mut warnings)?;
    }

    let output = if first.plugin {
        for rest in iter {
            compose::merge(&mut first, rest, &mut warnings)?;
        }
        first
    } else {
        let plugins: Vec<Tree> = iter.collect();
        if !plugins.is_empty() && first.find_child(first.root_id(), "__symbols__").is_none() {
            first.get_or_add_child(first.root_id(), "__symbols__");
        }
        let mut plugins = plugins.into_iter();
        if let Some(mut combined) = plugins.next() {
            for p in plugins {
                compose::merge(&mut combined, p, &mut warnings)?;
            }
            compose::apply(&mut first, &combined, &mut warnings)?;
        }
        first
    };

    let mut text = emit::emit(&output, args.sort);
    if args.redo_comment {
        let argv: Vec<String> = std::env::args().skip(1).collect();
        text = format!("{}{}", redo_comment(&argv), text);
    }
    print!("{text}");

    if args.warn {
        for w in &warnings.0 {
            eprintln!("{w}");
        }
    }

    Ok(())
}

/// Sets `/aliases/i2c` and `/aliases/i2c_arm` from `/aliases/i2c1`, and
/// attaches fresh labels `i2c`/`i2c_arm` to the node it resolves to
/// (spec.md §6, "Pi extras").
fn apply_pi_extras(base: &mut Tree, warnings: &mut Warnings) -> DtsResult<()> {
    let aliases = match base.find_child(base.root_id(), "aliases") {
        Some(id) => id,
        None => return Ok(()),
    };
    let i2c1 = match base.get(aliases).find_property("i2c1") {
        Some(p) => p.clone(),
        None => return Ok(()),
    };
    let label = match i2c1.chunks.first() {
        Some(Chunk::LabelRef(l)) => l.clone(),
        _ => return Ok(()),
    };
    let target = *base
        .labels
        .get(&label)
        .ok_or_else(|| DtsError::UnknownLabel {
            file: String::new(),
            label: label.clone(),
        })?;

    base.write_property(aliases, Property::new("i2c", vec![Chunk::LabelRef(label.clone())]));
    base.write_property(aliases, Property::new("i2c_arm", vec![Chunk::LabelRef(label.clone())]));
    base.declare_label(target, "i2c", "<pi-extras>", warnings)?;
    base.declare_label(target, "i2c_arm", "<pi-extras>", warnings)?;
    Ok(())
}

fn print_include_hierarchy(opener: &dyn FileOpener, path: &str) -> DtsResult<()> {
    let tokens = Tokenizer::new(opener).tokenize(path)?;
    let mut depth = 0usize;
    let mut stack: Vec<String> = Vec::new();
    for t in &tokens {
        if let TokenKind::FileMarker(f) = &t.kind {
            // An include site emits two markers for the same file: one on
            // entry (pushes `f` as a new top of stack) and one on return
            // (carries the *parent*'s name, already one level below the
            // top). Only the latter ever equals the entry below the top.
            let is_restore = stack.len() >= 2 && &stack[stack.len() - 2] == f;
            if is_restore {
                stack.pop();
                depth = depth.saturating_sub(1);
            } else {
                println!("{}{}", "  ".repeat(depth), f);
                stack.push(f.clone());
                depth += 1;
            }
        }
    }
    Ok(())
}

fn redo_comment(args: &[String]) -> String {
    let quoted: Vec<String> = args
        .iter()
        .map(|a| {
            if a.chars().any(char::is_whitespace) {
                format!("'{a}'")
            } else {
                a.clone()
            }
        })
        .collect();
    format!("// redo: ovmerge {}\n", quoted.join(" "))
}

fn replace_argv_from_stdin() -> DtsResult<Args> {
    use std::io::BufRead;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| DtsError::Io {
            path: "<stdin>".to_string(),
            source: e.into(),
        })?;
    let line = line.trim_end();
    let argv = split_redo_line(line).ok_or_else(|| {
        DtsError::Other(format!(
            "stdin does not match '// redo: ovmerge ...': {line:?}"
        ))
    })?;
    let mut full = vec!["ovmerge".to_string()];
    full.extend(argv);
    Ok(Args::parse_from(full))
}

fn split_redo_line(line: &str) -> Option<Vec<String>> {
    let rest = line.strip_prefix("// redo: ovmerge ")?;
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    for c in rest.chars() {
        match c {
            '\'' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !cur.is_empty() {
                    out.push(std::mem::take(&mut cur));
                }
            }
            c => cur.push(c),
        }
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_ovspec() {
        let s = parse_ovspec("cam0,speed=400000,sw");
        assert_eq!(s.name, "cam0");
        assert_eq!(
            s.params,
            vec![
                ("speed".to_string(), Some("400000".to_string())),
                ("sw".to_string(), None),
            ]
        );
        assert!(s.bake_overrides);
    }

    #[test]
    fn parses_colon_separated_first_param() {
        let s = parse_ovspec("cam0:speed=400000");
        assert_eq!(s.name, "cam0");
        assert_eq!(s.params, vec![("speed".to_string(), Some("400000".to_string()))]);
    }

    #[test]
    fn trailing_comma_signals_bake_overrides_with_no_params() {
        let s = parse_ovspec("cam0,");
        assert_eq!(s.name, "cam0");
        assert!(s.params.is_empty());
        assert!(s.bake_overrides);
    }

    #[test]
    fn plain_name_has_no_params_and_does_not_bake() {
        let s = parse_ovspec("base");
        assert_eq!(s.name, "base");
        assert!(s.params.is_empty());
        assert!(!s.bake_overrides);
    }

    #[test]
    fn redo_comment_quotes_whitespace_args() {
        let out = redo_comment(&["base".to_string(), "overlay,speed=4 00".to_string()]);
        assert_eq!(out, "// redo: ovmerge base 'overlay,speed=4 00'\n");
    }

    #[test]
    fn split_redo_line_respects_single_quotes() {
        let argv = split_redo_line("// redo: ovmerge base 'overlay,speed=4 00'").unwrap();
        assert_eq!(argv, vec!["base".to_string(), "overlay,speed=4 00".to_string()]);
    }
}
