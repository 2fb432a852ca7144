use anyhow::Result;

fn main() -> Result<()> {
    if let Err(err) = fellowship::run() {
        if err.is_integrity_incident() {
            eprintln!(
                "integrity incident: committed state needs manual reconciliation; \
                 run `fellowship audit` and `fellowship journal verify` before any further change"
            );
        }
        return Err(err.into());
    }
    Ok(())
}
