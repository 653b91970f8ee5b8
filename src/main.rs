use std::process::ExitCode;

fn main() -> ExitCode {
    match raman_orient::app::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}
