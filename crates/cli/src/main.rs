//! Command-line build and search tools for datrie containers.
//!
//! `datrie build` turns a record file into a serialized trie; `datrie
//! search` loads one and answers queries from stdin. A record file holds
//! one record per line: a key, optionally followed by a TAB and the value
//! text. Records must already be sorted in dictionary order of keys.

use std::env;
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use datrie::{Builder, Element4, Element5, ElementLayout, Record, TailValue, Trie};

const USAGE: &str = "\
USAGE: datrie COMMAND [OPTIONS]

COMMANDS:
  build INPUT        build a trie from a record file (one `key<TAB>value`
                     per line, sorted by key) and report statistics
  search             load a trie and answer queries from stdin; prefix a
                     query line with `prefix:` to enumerate prefix matches

OPTIONS:
  -t, --type TYPE    value type: empty (default), int, double, string
  -c, --compact      4-byte double-array elements instead of 5-byte
  -d, --db FILE      trie container file to write (build) or read (search)
  -i, --in           membership checks only: print `key<TAB>1` or
                     `key<TAB>0` per query instead of looking up values
  -h, --help         show this message
";

#[derive(Clone, Copy, PartialEq)]
enum ValueType {
    Empty,
    Int,
    Double,
    Str,
}

struct Options {
    value_type: ValueType,
    compact: bool,
    check: bool,
    db: Option<String>,
    input: Option<String>,
}

impl Options {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut opts = Options {
            value_type: ValueType::Empty,
            compact: false,
            check: false,
            db: None,
            input: None,
        };
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-t" | "--type" => {
                    let ty = args.next().context("--type needs an argument")?;
                    opts.value_type = match ty.as_str() {
                        "empty" => ValueType::Empty,
                        "int" => ValueType::Int,
                        "double" => ValueType::Double,
                        "string" => ValueType::Str,
                        other => bail!("unknown value type: {other}"),
                    };
                }
                "-c" | "--compact" => opts.compact = true,
                "-i" | "--in" => opts.check = true,
                "-d" | "--db" => opts.db = Some(args.next().context("--db needs an argument")?),
                "-h" | "--help" => {
                    print!("{USAGE}");
                    std::process::exit(0);
                }
                other if other.starts_with('-') => bail!("unrecognized option: {other}"),
                other => {
                    if opts.input.is_some() {
                        bail!("unexpected argument: {other}");
                    }
                    opts.input = Some(other.to_string());
                }
            }
        }
        Ok(opts)
    }
}

/// Text form of a record value, for record files and query output.
trait FieldValue: TailValue {
    fn parse_field(field: Option<&str>) -> Result<Self>;
    fn render(&self) -> String;
}

impl FieldValue for () {
    fn parse_field(_field: Option<&str>) -> Result<Self> {
        Ok(())
    }

    fn render(&self) -> String {
        String::new()
    }
}

impl FieldValue for i32 {
    fn parse_field(field: Option<&str>) -> Result<Self> {
        Ok(field.context("record has no value field")?.parse()?)
    }

    fn render(&self) -> String {
        self.to_string()
    }
}

impl FieldValue for f64 {
    fn parse_field(field: Option<&str>) -> Result<Self> {
        Ok(field.context("record has no value field")?.parse()?)
    }

    fn render(&self) -> String {
        self.to_string()
    }
}

impl FieldValue for String {
    fn parse_field(field: Option<&str>) -> Result<Self> {
        Ok(field.unwrap_or_default().to_string())
    }

    fn render(&self) -> String {
        self.clone()
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let command = match args.next() {
        Some(c) => c,
        None => {
            print!("{USAGE}");
            return Ok(());
        }
    };
    let opts = Options::parse(args)?;

    match (command.as_str(), opts.compact) {
        ("build", false) => build_any::<Element5>(&opts),
        ("build", true) => build_any::<Element4>(&opts),
        ("search", false) => search_any::<Element5>(&opts),
        ("search", true) => search_any::<Element4>(&opts),
        ("-h" | "--help", _) => {
            print!("{USAGE}");
            Ok(())
        }
        (other, _) => bail!("unknown command: {other}"),
    }
}

fn build_any<E: ElementLayout>(opts: &Options) -> Result<()> {
    match opts.value_type {
        ValueType::Empty => build_cmd::<(), E>(opts),
        ValueType::Int => build_cmd::<i32, E>(opts),
        ValueType::Double => build_cmd::<f64, E>(opts),
        ValueType::Str => build_cmd::<String, E>(opts),
    }
}

fn search_any<E: ElementLayout>(opts: &Options) -> Result<()> {
    match opts.value_type {
        ValueType::Empty => search_cmd::<(), E>(opts),
        ValueType::Int => search_cmd::<i32, E>(opts),
        ValueType::Double => search_cmd::<f64, E>(opts),
        ValueType::Str => search_cmd::<String, E>(opts),
    }
}

fn read_records<V: FieldValue>(path: &str) -> Result<Vec<Record<V>>> {
    let file = File::open(path).with_context(|| format!("cannot open input file {path}"))?;
    let mut records = Vec::new();
    for (lineno, line) in io::BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let (key, value_text) = match line.split_once('\t') {
            Some((k, v)) => (k, Some(v)),
            None => (line.as_str(), None),
        };
        let value = V::parse_field(value_text)
            .with_context(|| format!("bad record on line {}", lineno + 1))?;
        records.push(Record::new(key, value));
    }
    Ok(records)
}

fn build_cmd<V: FieldValue, E: ElementLayout>(opts: &Options) -> Result<()> {
    let input = opts.input.as_deref().context("no input file specified")?;
    let records: Vec<Record<V>> = read_records(input)?;
    eprintln!("Read {} records from {input}", records.len());

    let mut builder = Builder::<V, E>::new();
    let mut dots = 0usize;
    builder.set_progress(move |done, total| {
        let target = done * 10 / total;
        while dots < target {
            eprint!(".");
            dots += 1;
        }
        if done == total {
            eprintln!();
        }
    });
    builder.build(&records)?;

    let stats = builder.stats();
    eprintln!("Double array: {} elements ({} bytes)", stats.da_elements, stats.da_bytes);
    eprintln!(
        "  in use: {} ({:.1}% utilization)",
        stats.da_used,
        stats.da_utilization * 100.0
    );
    eprintln!("  nodes: {}, leaves: {}", stats.da_nodes, stats.da_leaves);
    eprintln!("Tail array: {} bytes", stats.tail_bytes);
    eprintln!(
        "Base search: {} trials ({:.2} per element)",
        stats.base_trials, stats.avg_base_trials
    );

    if let Some(db) = opts.db.as_deref() {
        let file = File::create(db).with_context(|| format!("cannot create {db}"))?;
        let mut w = BufWriter::new(file);
        builder.write(&mut w)?;
        w.flush()?;
        eprintln!("Wrote {db}");
    }
    Ok(())
}

fn search_cmd<V: FieldValue, E: ElementLayout>(opts: &Options) -> Result<()> {
    let db = opts.db.as_deref().context("no database file specified")?;
    let mut file = File::open(db).with_context(|| format!("cannot open {db}"))?;
    let trie: Trie<'static, V, E> = Trie::from_reader(&mut file)?;
    eprintln!("Loaded {} records from {db}", trie.len());

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in stdin.lock().lines() {
        let line = line?;
        if opts.check {
            let hit = trie.contains(line.as_bytes());
            writeln!(out, "{}\t{}", line, hit as u8)?;
        } else if let Some(query) = line.strip_prefix("prefix:") {
            let mut cursor = trie.prefix(query.as_bytes());
            let mut hits = 0usize;
            while let Some(hit) = cursor.next()? {
                writeln!(out, "{}\t{}", &query[..hit.length], hit.value.render())?;
                hits += 1;
            }
            writeln!(out, "{hits} prefix match(es)")?;
        } else {
            match trie.find(line.as_bytes())? {
                Some(value) => writeln!(out, "{}\t{}", line, value.render())?,
                None => writeln!(out, "{line}\tnot found")?,
            }
        }
    }
    Ok(())
}
