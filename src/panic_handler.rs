use std::io::{self, Write};
use std::panic;

pub fn initialize_panic_handler() {
    better_panic::install();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        log::error!("Panic: {panic_info}");
        log::logger().flush();
        flush_output();

        default_hook(panic_info);

        std::process::exit(1);
    }));
}

/// Flush anything half-printed so the panic report starts on a clean line
pub fn flush_output() {
    let _ = io::stdout().flush();
    let _ = writeln!(io::stderr());
}
