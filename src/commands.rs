//! Commands exposed by the CLI, each as a method on [`crate::App`].

pub mod release;
