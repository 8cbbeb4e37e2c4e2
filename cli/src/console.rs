use std::io;
use std::io::Write;

use colored::Colorize;

pub fn print_error_message(error_message: &str) {
    println!("{}", error_message.red());
}

pub fn print_warn_message(warn_message: &str) {
    println!("{}", warn_message.yellow());
}

pub fn print_success_message(success_message: &str) {
    println!("{}", success_message.green());
}

/// Asks until one of `options` is typed. A closed stdin picks the last option.
pub fn prompt_for_input_list(field_name: &str, options: &[String]) -> String {
    let options_str = options.join(", ");
    let fallback = options.last().cloned().unwrap_or_default();

    loop {
        print!("{} [{}]: ", field_name.to_string().green(), options_str.yellow());
        if io::stdout().flush().is_err() {
            return fallback;
        }

        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(0) | Err(_) => return fallback,
            Ok(_) => {}
        }
        let trimmed = input.trim().to_lowercase();

        if options.contains(&trimmed) {
            return trimmed;
        } else {
            println!(
                "{}",
                format!("Invalid option. Please choose one of the following: {}", options_str)
                    .red()
            );
        }
    }
}

pub fn confirm(question: &str) -> bool {
    prompt_for_input_list(question, &["yes".to_string(), "no".to_string()]) == "yes"
}
