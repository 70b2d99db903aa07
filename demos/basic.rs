use tx_kernel::memory::MemoryResourceManager;
use tx_kernel::{with_transaction, Error, ExecutionContext, TransactionManager};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Log the engine's lifecycle decisions (RUST_LOG=debug shows them all)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut manager = TransactionManager::new(MemoryResourceManager::new());
    let mut cx = ExecutionContext::new();

    println!("=== Basic Transaction Example ===\n");

    // Example 1: Simple recorded work
    println!("1. Creating a user...");
    with_transaction(&mut manager, &mut cx, None, |cx, _status| {
        MemoryResourceManager::record(cx, "insert user 'Alice'")?;
        Ok(())
    })?;
    println!("   ✓ User created successfully\n");

    // Example 2: Multiple operations in one transaction
    println!("2. Creating user with profile...");
    with_transaction(&mut manager, &mut cx, None, |cx, _status| {
        MemoryResourceManager::record(cx, "insert user 'Bob'")?;
        // Same transaction: both entries commit together
        MemoryResourceManager::record(cx, "insert profile for 'Bob'")?;
        Ok(())
    })?;
    println!("   ✓ User and profile created\n");

    // Example 3: Error handling and automatic rollback
    println!("3. Testing automatic rollback on error...");
    let before = manager.resource_manager().committed().len();
    let result: Result<(), Error> = with_transaction(&mut manager, &mut cx, None, |cx, _status| {
        MemoryResourceManager::record(cx, "insert user 'Charlie'")?;

        // This will cause an error
        Err(Error::TransactionUsage("email address already taken".into()))
    });

    match result {
        Ok(_) => println!("   ✗ Should have failed!"),
        Err(e) => println!("   ✓ Transaction rolled back: {}\n", e),
    }
    assert_eq!(manager.resource_manager().committed().len(), before);

    // Example 4: Marking a transaction rollback-only without an error
    println!("4. Rollback-only without raising an error...");
    with_transaction(&mut manager, &mut cx, None, |cx, status| {
        MemoryResourceManager::record(cx, "insert user 'Dave'")?;
        // Commit is turned into a clean rollback
        status.set_rollback_only();
        Ok(())
    })?;
    println!("   ✓ Completed without committing 'Dave'\n");

    println!("Committed entries:");
    for entry in manager.resource_manager().committed() {
        println!("   - {}", entry);
    }

    println!("\n=== All examples completed successfully ===");
    Ok(())
}
