use minishell::Interpreter;

fn main() {
    let code = match Interpreter::default().repl() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("minishell: {err:#}");
            1
        }
    };
    std::process::exit(code);
}
