use markless_core::config::EditorFontConfig;
use markless_core::config::MarklessConfig;
use markless_core::host::ActiveDocument;
use markless_core::host::MemoryHost;
use markless_core::theme::ThemeKind;
use markless_markdown::controller::Controller;
use std::env;
use std::fs;
use std::io;
use std::io::Read;
use std::path::Path;

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = env::args().skip(1).collect::<Vec<_>>();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        return Ok(());
    }

    let mut config = MarklessConfig::default();
    let mut theme = ThemeKind::Dark;
    let mut caret: Option<usize> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                let path = parse_string(&args, &mut i, "--config")?;
                let json = fs::read_to_string(path)?;
                config = MarklessConfig::from_json(&json)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            }
            "--light" => {
                theme = ThemeKind::Light;
                i += 1;
            }
            "--caret" => {
                let v = parse_string(&args, &mut i, "--caret")?;
                caret = Some(v.parse::<usize>().map_err(|e| {
                    io::Error::new(io::ErrorKind::InvalidInput, format!("--caret invalid: {e}"))
                })?);
            }
            _ => break,
        }
    }

    let input = if i < args.len() {
        let path = &args[i];
        let input = fs::read_to_string(path)?;
        if config.base_url.is_none()
            && let Some(parent) = Path::new(path).parent()
        {
            let abs = fs::canonicalize(parent).unwrap_or_else(|_| parent.to_path_buf());
            config.base_url = Some(format!("{}/", abs.display()));
        }
        input
    } else {
        let mut s = String::new();
        io::stdin().read_to_string(&mut s)?;
        s
    };

    let mut document = ActiveDocument::markdown(input.as_str());
    document.caret = caret.unwrap_or(0);
    let mut host = MemoryHost::with_document(document);
    let mut controller = Controller::new(config, EditorFontConfig::default(), theme);
    let outcome = controller.recompute(&mut host);
    println!("outcome: {outcome:?}");

    for (style, ranges) in host.painted() {
        println!("{style:?}");
        for range in ranges {
            let text = input.get(range.clone()).unwrap_or("");
            println!("  {:>6}..{:<6} {:?}", range.start, range.end, text);
        }
    }

    for image in controller.images() {
        println!("image {:?} {} ({})", image.range, image.url, image.alt);
    }
    for job in controller.pending_diagrams() {
        println!("pending diagram ({} bytes)", job.key.source.len());
    }
    if caret.is_some()
        && let Some(reveal) = controller.reveal()
    {
        println!("reveal:\n{}", reveal.to_markdown());
    }

    Ok(())
}

fn print_help() {
    eprintln!(
        "Usage: dump [options] [path]\n\
\n\
Options:\n\
  --config <file>     markless settings as JSON (camelCase keys)\n\
  --light             Use the light theme palette\n\
  --caret <offset>    Caret byte offset; prints the reveal popup\n\
  -h, --help          Show this help\n\
\n\
If [path] is omitted, reads Markdown from stdin."
    );
}

fn parse_string(args: &[String], i: &mut usize, flag: &str) -> io::Result<String> {
    let Some(v) = args.get(*i + 1) else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{flag} expects a value"),
        ));
    };
    *i += 2;
    Ok(v.to_string())
}
