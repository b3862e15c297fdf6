use std::process::ExitCode;

mod app;
mod checker;
mod cli;
mod config;
mod logger;
mod mediawiki;
mod notify;
mod runner;
mod scope;
mod shell;
mod store;
mod wiki;

#[cfg(test)]
mod unit_tests;

fn main() -> ExitCode {
    app::main()
}
