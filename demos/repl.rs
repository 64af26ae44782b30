use lispxp::builtinops::Arity;
use lispxp::reader::read_all;
use lispxp::{EVAL_STACK_SIZE, Environment, Error, ParseErrorKind, Value, create_global_env, eval, pr_str};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::process;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

fn main() {
    // Deep non-tail recursion needs more than the default main-thread stack
    let handle = thread::Builder::new()
        .name("repl".into())
        .stack_size(EVAL_STACK_SIZE)
        .spawn(run_repl);

    let result = match handle {
        Ok(handle) => handle.join(),
        Err(e) => {
            eprintln!("Could not start the REPL thread: {e}");
            process::exit(1);
        }
    };

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

/// Host primitives the core library leaves to its embedder
fn register_host_natives(env: &Environment) {
    env.define_native("slurp", Arity::Exact(1), |_ctx, args| {
        let path = args[0].as_str()?;
        std::fs::read_to_string(path)
            .map(Value::String)
            .map_err(|e| Error::EvalError(format!("slurp {path}: {e}")))
    });

    env.define_native("time-ms", Arity::Exact(0), |_ctx, _args| {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::EvalError(format!("clock error: {e}")))?
            .as_millis();
        Ok(Value::from(i64::try_from(millis).unwrap_or(i64::MAX)))
    });
}

fn is_incomplete(error: &Error) -> bool {
    matches!(error, Error::SyntaxError(e) if e.kind == ParseErrorKind::Incomplete)
}

fn eval_forms(forms: &[Value], env: &Environment) -> Result<Value, Error> {
    let mut result = Value::Nil;
    for form in forms {
        result = eval(form, env)?;
    }
    Ok(result)
}

fn run_repl() {
    let silent = std::env::var_os("LISPXP_SILENT").is_some();

    if !silent {
        println!("lispxp - a Lisp with macros and proper tail calls");
        println!("Enter expressions like: (+ 1 2)");
        println!("Type :help for more commands, or Ctrl+D to exit.");
        println!();
    }

    let mut rl = DefaultEditor::new().expect("Could not initialize REPL");
    let env = create_global_env();
    register_host_natives(&env);

    // Lines of a form that is still missing its closing delimiters
    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() { "lispxp> " } else { "   ...> " };
        match rl.readline(prompt) {
            Ok(line) => {
                if pending.is_empty() {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    // Handle special commands
                    match trimmed {
                        ":help" => {
                            let _ = rl.add_history_entry(trimmed);
                            print_help();
                            continue;
                        }
                        ":env" => {
                            let _ = rl.add_history_entry(trimmed);
                            print_environment(&env);
                            continue;
                        }
                        ":quit" | ":exit" => {
                            println!("Goodbye!");
                            break;
                        }
                        _ => {}
                    }
                }

                pending.push_str(&line);
                pending.push('\n');

                // Nothing is evaluated until every form in the buffer is complete
                let forms = read_all(&pending);
                if forms.as_ref().is_err_and(is_incomplete) {
                    continue;
                }

                match forms.and_then(|forms| eval_forms(&forms, &env)) {
                    Ok(result) => {
                        if !silent {
                            println!("{}", pr_str(&result, true));
                        }
                    }
                    Err(e) => println!("Error: {e}"),
                }

                let _ = rl.add_history_entry(pending.trim_end());
                pending.clear();
            }

            Err(ReadlineError::Interrupted) => {
                // Ctrl+C abandons a partial form
                pending.clear();
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  Ctrl+C     - Abandon the current multi-line input");
    println!("  Ctrl+D     - Exit the interpreter");
    println!();
    println!("Special forms:");
    println!("  def let let* quote syntax-quote defmacro macroexpand do if fn try set!");
    println!();
    println!("Host functions:");
    println!("  (slurp \"file\")   - Read a file as a string");
    println!("  (load-file \"f\")  - Evaluate every form in a file");
    println!("  (time-ms)        - Milliseconds since the epoch");
    println!();
    println!("Examples:");
    println!("  (defn fact [n] (if (<= n 1) 1 (* n (fact (- n 1)))))");
    println!("  (map #(* % %) [1 2 3])");
    println!("  `(1 ~(+ 1 1) ~@(list 3 4))");
    println!("  (try (throw \"boom\") (catch e (str \"caught:\" e)))");
    println!();
    println!("Set LISPXP_SILENT to suppress the banner and result echo.");
}

fn print_environment(env: &Environment) {
    let bindings = env.get_all_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    // Separate native functions from values defined in the language
    let mut natives = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::Native(_) => natives.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !natives.is_empty() {
        println!("Native functions ({}):", natives.len());
        // Print in columns for readability
        let mut col = 0;
        for name in natives {
            print!("  {name:<15}");
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("Defined in the language ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
