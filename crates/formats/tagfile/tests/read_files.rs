use std::path::PathBuf;

use tagfile::{read_any, Compendium, CompendiumSet, Decoder, ReadOptions, Tagfile};

/// Sample files from `$TAGFILE_SAMPLES`, compendiums first.
fn samples() -> Option<Vec<PathBuf>> {
    let dir = std::env::var_os("TAGFILE_SAMPLES")?;
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|e| e == "hkx" || e == "compendium"))
        .collect();
    paths.sort_by_key(|p| (p.extension().is_some_and(|e| e != "compendium"), p.clone()));
    Some(paths)
}

#[test]
fn decode_sample_files() {
    let Some(paths) = samples() else {
        eprintln!("skipping: TAGFILE_SAMPLES not set");
        return;
    };
    let options = ReadOptions::default();
    let mut compendiums = CompendiumSet::new();
    for path in paths {
        let data = std::fs::read(&path).expect("failed to read sample");
        match read_any(&data, Some(&compendiums), &options) {
            Ok(Tagfile::Compendium(c)) => {
                let again = Compendium::parse(&c.to_bytes().unwrap()).unwrap();
                assert_eq!(c, again, "{}", path.display());
                compendiums.insert(&c);
            }
            Ok(Tagfile::Objects(file)) => {
                let reencoded = file.to_bytes().unwrap();
                let again = tagfile::TagFile::parse_with(&reencoded, Some(&compendiums), &options)
                    .unwrap();
                assert_eq!(file, again, "{}", path.display());
                let graph = Decoder::new(&file).decode_all();
                eprintln!(
                    "{}: {} objects, {} failures, unknown {:?}",
                    path.display(),
                    graph.objects.len(),
                    graph.failures.len(),
                    graph.unknown_types
                );
            }
            Err(e) => panic!("{}: {e}", path.display()),
        }
    }
}
