use tx_kernel::memory::MemoryResourceManager;
use tx_kernel::{
    with_nested_transaction, Error, ExecutionContext, Propagation, TransactionDefinition,
    TransactionManager,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Nested transactions must be enabled explicitly
    let mut manager = TransactionManager::new(MemoryResourceManager::new())
        .with_nested_transaction_allowed(true);
    let mut cx = ExecutionContext::new();

    println!("=== Nested Transaction (Savepoint) Example ===\n");

    // Example 1: Nested transaction fails, outer succeeds
    println!("1. Nested transaction fails, outer succeeds...");
    let mut outer = manager.get_transaction(&mut cx, None)?;
    MemoryResourceManager::record(&mut cx, "insert user 'Eve'")?;
    println!("   Outer: Created user");

    let nested_result: Result<(), Error> =
        with_nested_transaction(&mut manager, &mut cx, |cx, _status| {
            MemoryResourceManager::record(cx, "append audit entry for 'Eve'")?;
            // This will fail; only the audit entry is rolled back
            Err(Error::TransactionUsage("audit store unavailable".into()))
        });

    match nested_result {
        Ok(_) => println!("   ✗ Nested should have failed!"),
        Err(e) => println!("   Nested: Failed ({})", e),
    }

    println!("   Outer: Continuing despite nested failure...");
    manager.commit(&mut cx, &mut outer)?;
    println!("   ✓ Outer transaction committed (user created)\n");

    // Example 2: Multiple nested transactions in sequence
    println!("2. Multiple nested transactions...");
    let mut outer = manager.get_transaction(&mut cx, None)?;
    MemoryResourceManager::record(&mut cx, "insert user 'Frank'")?;
    println!("   Outer: Created user");

    with_nested_transaction(&mut manager, &mut cx, |cx, _status| {
        MemoryResourceManager::record(cx, "insert profile for 'Frank'")?;
        println!("   Nested 1: Created profile");
        Ok(())
    })?;

    with_nested_transaction(&mut manager, &mut cx, |cx, _status| {
        MemoryResourceManager::record(cx, "append audit entry for 'Frank'")?;
        println!("   Nested 2: Created audit log");
        Ok(())
    })?;

    manager.commit(&mut cx, &mut outer)?;
    println!("   ✓ All transactions committed\n");

    // Example 3: Nested behaves like Required without an outer transaction
    println!("3. Nested propagation without an outer transaction...");
    let definition = TransactionDefinition::new().with_propagation(Propagation::Nested);
    let mut status = manager.get_transaction(&mut cx, Some(&definition))?;
    assert!(status.is_new_transaction());
    MemoryResourceManager::record(&mut cx, "insert user 'Grace'")?;
    manager.commit(&mut cx, &mut status)?;
    println!("   ✓ Created a regular top-level transaction\n");

    println!("Committed entries:");
    for entry in manager.resource_manager().committed() {
        println!("   - {}", entry);
    }

    println!("\n=== All nested transaction examples completed ===");
    Ok(())
}
