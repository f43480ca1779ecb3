use std::path::Path;
use std::process::ExitCode;
use std::rc::Rc;

use curv::{Exception, Program, ScCompiler, ScType, Source, System, Value, repr, to_json};

const USAGE: &str = "usage: curv [-x EXPR | FILE] [--json] [--glsl]";

enum Input {
    File(String),
    Expr(String),
}

enum Output {
    Value,
    Json,
    Glsl,
}

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let mut input = None;
    let mut output = Output::Value;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-x" => match args.next() {
                Some(expr) => input = Some(Input::Expr(expr)),
                None => {
                    eprintln!("{USAGE}");
                    return ExitCode::FAILURE;
                }
            },
            "--json" => output = Output::Json,
            "--glsl" => output = Output::Glsl,
            "-h" | "--help" => {
                println!("{USAGE}");
                return ExitCode::SUCCESS;
            }
            _ if input.is_none() => input = Some(Input::File(arg)),
            _ => {
                eprintln!("{USAGE}");
                return ExitCode::FAILURE;
            }
        }
    }
    let Some(input) = input else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };

    let system = System::new();
    let result = run(&input, &output, system);
    match result {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(input: &Input, output: &Output, system: Rc<System>) -> Result<String, Exception> {
    let mut prog = Program::new(Rc::clone(&system));
    match input {
        Input::Expr(text) => prog.compile(Source::new("[expr]", text.clone()))?,
        Input::File(path) => {
            let text = std::fs::read_to_string(Path::new(path))
                .map_err(|e| Exception::bare(format!("\"{path}\": {e}")))?;
            prog.compile(Source::new(path.clone(), text))?;
        }
    }
    let value = prog.eval()?;
    match output {
        Output::Value => Ok(repr(&value)),
        Output::Json => {
            let json = to_json(&value, &curv::context::AtSystem)?;
            Ok(json.to_string())
        }
        Output::Glsl => compile_glsl(&value),
    }
}

/// Compile the program's value as a distance function `[x,y,z,t] -> num`.
fn compile_glsl(value: &Value) -> Result<String, Exception> {
    let mut sc = ScCompiler::new();
    sc.define_function(
        "dist",
        ScType::vec(4),
        ScType::num(),
        value,
        &curv::context::AtSystem,
    )
}
