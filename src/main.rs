use dynarray::{ArrayParams, DynArray, HashTree, InlineStr};

type Key = InlineStr<16>;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dynarray=info".parse()?),
        )
        .init();

    println!("Array demo:");
    let mut numbers = DynArray::<i32>::with_params(ArrayParams::default().with_capacity(4))?
        .with_comparator(i32::cmp);
    numbers.append_all(&[8, 7, 6, 1, 0, 9, 2, 6, 0]);
    println!("appended: {:?} (capacity {})", numbers.as_slice(), numbers.capacity());
    numbers.sort();
    println!("sorted:   {:?}", numbers.as_slice());
    println!("index of 6: {:?}", numbers.search(&6));

    println!("\nTree demo:");
    let mut tree = HashTree::<Key, u32>::new(Key::cmp);
    for i in 0..10u32 {
        tree.set(Key::new(format!("Key {i}"))?, i);
    }
    println!(
        "{} entries, depth {} before balancing",
        tree.len(),
        tree.max_depth(tree.root())
    );
    tree.balance();
    println!("depth {} after balancing:", tree.max_depth(tree.root()));
    print!("{}", tree.draw_tree());

    let removed = tree.delete(&Key::new("Key 4")?);
    println!("deleted: {removed:?}, {} entries left", tree.len());
    Ok(())
}
