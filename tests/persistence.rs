use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};

use dynarray::{
    ArrayParams, DynArray, HashEntry, HashTree, InlineStr, StoreError, TreeParams,
    FORMAT_VERSION, HEADER_SIZE,
};
use tempfile::tempdir;

type Text = InlineStr<16>;

fn key(i: usize) -> Text {
    Text::new(format!("Key {i}")).unwrap()
}

fn value(i: usize) -> Text {
    Text::new(format!("Values {i}")).unwrap()
}

fn overwrite(path: &std::path::Path, offset: u64, bytes: &[u8]) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(bytes).unwrap();
}

#[test]
fn mapped_array_survives_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("numbers.bin");

    {
        let params = ArrayParams::default().with_capacity(4).with_path(&path);
        let mut array = DynArray::<u32>::with_params(params).unwrap();
        assert!(array.is_mapped());
        assert_eq!(array.path(), Some(path.as_path()));
        for value in 0..10 {
            array.append(value * 3);
        }
        assert_eq!(array.capacity(), 13);
        array.sync().unwrap();
    }

    let len = std::fs::metadata(&path).unwrap().len();
    assert_eq!(len, (HEADER_SIZE + 13 * 4) as u64);

    let mut array = DynArray::<u32>::load(&path).unwrap();
    assert_eq!(array.len(), 10);
    assert_eq!(array.capacity(), 13);
    assert_eq!(array.growth(), 1.5);
    assert_eq!(array.as_slice(), (0..10).map(|v| v * 3).collect::<Vec<_>>().as_slice());

    let header = array.header().unwrap();
    assert_eq!(header.version, FORMAT_VERSION);
    assert_eq!(header.element_size, 4);
    assert_eq!(header.size, 10);
    assert_eq!(header.capacity, 13);

    assert!(array.comparator().is_none());
    assert_eq!(array.search(&9), None);
    array.set_comparator(Some(u32::cmp));
    assert_eq!(array.search(&9), Some(3));
}

#[test]
fn header_tracks_size_on_drop() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("drop.bin");
    {
        let mut array =
            DynArray::<i64>::with_params(ArrayParams::default().with_path(&path)).unwrap();
        array.append_all(&[5, -5, 7]);
        array.pop();
        array.set_metadata(b"owner");
    }

    let array = DynArray::<i64>::load(&path).unwrap();
    assert_eq!(array.as_slice(), &[5, -5]);
    assert_eq!(array.capacity(), 10);
    assert_eq!(&array.metadata()[..5], b"owner");
}

#[test]
fn reduce_capacity_shrinks_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shrink.bin");
    let mut array =
        DynArray::<u64>::with_params(ArrayParams::default().with_capacity(100).with_path(&path))
            .unwrap();
    array.append_all(&[1, 2, 3]);
    array.reduce_capacity();
    assert_eq!(array.capacity(), 3);
    assert_eq!(
        std::fs::metadata(&path).unwrap().len(),
        (HEADER_SIZE + 3 * 8) as u64
    );
    assert_eq!(array.as_slice(), &[1, 2, 3]);
}

#[test]
fn load_rejects_unknown_version() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("version.bin");
    drop(DynArray::<u32>::with_params(ArrayParams::default().with_path(&path)).unwrap());

    overwrite(&path, 0, &99u64.to_le_bytes());
    let err = DynArray::<u32>::load(&path).unwrap_err();
    assert!(matches!(err, StoreError::UnsupportedVersion { version: 99, .. }), "{err}");
}

#[test]
fn load_rejects_element_size_mismatch() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("size.bin");
    drop(DynArray::<u32>::with_params(ArrayParams::default().with_path(&path)).unwrap());

    let err = DynArray::<u64>::load(&path).unwrap_err();
    assert!(
        matches!(err, StoreError::ElementSize { expected: 8, found: 4, .. }),
        "{err}"
    );
}

#[test]
fn load_rejects_short_and_missing_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("short.bin");
    std::fs::write(&path, [0u8; 16]).unwrap();
    let err = DynArray::<u32>::load(&path).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { .. }), "{err}");

    let err = DynArray::<u32>::load(dir.path().join("missing.bin")).unwrap_err();
    assert!(matches!(err, StoreError::Open { .. }), "{err}");
}

#[test]
fn load_rejects_unaddressable_capacity() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("capacity.bin");
    {
        let mut array =
            DynArray::<u64>::with_params(ArrayParams::default().with_path(&path)).unwrap();
        array.append_all(&[1, 2, 3]);
    }

    overwrite(&path, 24, &((1u64 << 62) - 1).to_le_bytes());
    let err = DynArray::<u64>::load(&path).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { .. }), "{err}");

    overwrite(&path, 24, &1_000u64.to_le_bytes());
    let err = DynArray::<u64>::load(&path).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { .. }), "{err}");

    overwrite(&path, 24, &10u64.to_le_bytes());
    let array = DynArray::<u64>::load(&path).unwrap();
    assert_eq!(array.as_slice(), &[1, 2, 3]);
}

#[test]
fn open_file_is_locked() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("locked.bin");
    let _held = DynArray::<u32>::with_params(ArrayParams::default().with_path(&path)).unwrap();

    let err = DynArray::<u32>::load(&path).unwrap_err();
    assert!(matches!(err, StoreError::Locked { .. }), "{err}");
}

#[test]
fn zero_sized_elements_cannot_be_mapped() {
    let dir = tempdir().unwrap();
    let err = DynArray::<()>::with_params(ArrayParams::default().with_path(dir.path().join("unit.bin")))
        .unwrap_err();
    assert!(matches!(err, StoreError::UnsupportedElement { size: 0, .. }), "{err}");
}

#[test]
fn tree_survives_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tree.bin");

    let root = {
        let params = TreeParams::default().with_capacity(4).with_path(&path);
        let mut tree = HashTree::<Text, Text>::with_params(Text::cmp, params).unwrap();
        assert!(tree.is_mapped());
        for i in 0..10 {
            tree.set(key(i), value(i));
        }
        tree.balance();
        assert_eq!(tree.delete(&key(3)), Some((key(3), value(3))));
        tree.sync().unwrap();
        tree.root()
    };

    let tree = HashTree::<Text, Text>::load(&path, Text::cmp).unwrap();
    assert_eq!(tree.len(), 9);
    assert_eq!(tree.root(), root);
    assert!(tree.entry(root.unwrap()).unwrap().is_root());
    for i in (0..10).filter(|&i| i != 3) {
        assert_eq!(tree.get_value(&key(i)), Some(value(i)));
    }
    assert!(!tree.contains_key(&key(3)));
    assert!(tree.visit_nodes(|_, _| true));
}

#[test]
fn empty_tree_reloads_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.bin");
    {
        let mut tree =
            HashTree::<u32, u32>::with_params(u32::cmp, TreeParams::default().with_path(&path))
                .unwrap();
        tree.set(1, 1);
        tree.clear();
    }

    let mut tree = HashTree::<u32, u32>::load(&path, u32::cmp).unwrap();
    assert!(tree.is_empty());
    assert_eq!(tree.root(), None);
    tree.set(7, 49);
    assert_eq!(tree.get_value(&7), Some(49));
}

#[test]
fn tree_load_rejects_dangling_root() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dangling.bin");
    {
        let mut tree =
            HashTree::<u32, u32>::with_params(u32::cmp, TreeParams::default().with_path(&path))
                .unwrap();
        tree.set(1, 1);
    }
    {
        let mut nodes = DynArray::<HashEntry<u32, u32>>::load(&path).unwrap();
        nodes.set_metadata(&999u64.to_le_bytes());
    }

    let err = HashTree::<u32, u32>::load(&path, u32::cmp).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { .. }), "{err}");
}
