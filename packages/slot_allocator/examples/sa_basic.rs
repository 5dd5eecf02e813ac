//! Demonstrates basic usage of `SlotAllocator` as a table of connection handles.
//!
//! Run with `RUST_LOG=trace` to see the allocator's log events.

use slot_allocator::SlotAllocator;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Slot Allocator Basic Example ===");

    let connections = SlotAllocator::new(4);

    // Claiming a slot gives you a small integer handle that you can later use to look up
    // or release the payload again.
    let alice = connections.claim("alice@10.0.0.1").unwrap();
    let bob = connections.claim("bob@10.0.0.2").unwrap();
    let carol = connections.claim("carol@10.0.0.3").unwrap();

    println!("Claimed handles: alice={alice}, bob={bob}, carol={carol}");
    println!("State: {connections}");

    if let Some(peer) = connections.get(bob) {
        println!("Handle {bob} belongs to {peer}");
    }

    connections.release(bob);
    println!("Released handle {bob}. State: {connections}");

    // The most recently released slot is handed out first.
    let dave = connections.claim("dave@10.0.0.4").unwrap();
    println!("Dave reuses handle {dave}");

    let erin = connections.claim("erin@10.0.0.5").unwrap();
    println!("Erin got handle {erin}. State: {connections}");

    match connections.claim("frank@10.0.0.6") {
        Some(handle) => println!("Frank got handle {handle}"),
        None => println!("No free slot for Frank, the table is full"),
    }

    println!("Slot allocator example completed successfully!");
}
