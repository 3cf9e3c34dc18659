fn main() {
    println!("relay examples");
    println!("==============");
    println!();
    println!("Run examples with: cargo run --bin <example_name>");
    println!("Available examples:");
    println!("  - basic_dispatch: connecting receivers and sending signals");
    println!("  - lifetimes: connections removed when senders and receivers drop");
    println!("  - robust_plugins: robust sends, panics, and registry plugins");
}
