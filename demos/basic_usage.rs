use dynarray::{ArrayParams, DynArray, HashTree, InlineStr, TreeParams};

type Name = InlineStr<24>;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join("dynarray-basic-usage");
    std::fs::create_dir_all(&dir)?;

    let balances_path = dir.join("balances.bin");
    {
        let mut balances =
            DynArray::<f64>::with_params(ArrayParams::default().with_path(&balances_path))?;
        balances.append_all(&[1_250.45, 9_001.12, 310.0]);
        balances.sync()?;
    }
    let balances = DynArray::<f64>::load(&balances_path)?;
    println!("Reloaded balances: {:?}", balances.as_slice());

    let accounts_path = dir.join("accounts.bin");
    {
        let mut accounts = HashTree::<Name, f64>::with_params(
            Name::cmp,
            TreeParams::default().with_path(&accounts_path),
        )?;
        for (name, balance) in [("Checking", 1_250.45), ("Savings", 9_001.12), ("Brokerage", 310.0)] {
            accounts.set(Name::new(name)?, balance);
        }
        accounts.balance();
    }

    let accounts = HashTree::<Name, f64>::load(&accounts_path, Name::cmp)?;
    println!("Reloaded accounts:\n{}", accounts.draw_tree());
    println!("Savings: {:?}", accounts.get_value(&Name::new("Savings")?));
    Ok(())
}
