use std::fs::File;
use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{
    first_record, parse_smiles, read_records, show_2d, show_3d, show_grid, EmbedError, Molecule,
    Record, SdfWriter,
};

pub const DEFAULT_SDF_OUTPUT: &str = "mol_out.sdf";
pub const DEFAULT_BATCH_OUTPUT: &str = "moleculas_out.sdf";
pub const DEFAULT_GRID_OUTPUT: &str = "moleculas_grid.svg";

/// Fixed conformer seed so repeated runs produce identical geometry.
pub const EMBED_SEED: u64 = 42;

/// Scans a molecule file and reports the validity of every record without
/// producing any output files.
pub fn validate_file(path: &Path) -> Result<()> {
    println!("Reading file: {}", path.display());
    let records = read_records(path)?;
    println!("File opened. {} molecule records found.", records.len());

    let mut valid = 0usize;
    for record in &records {
        println!(
            "Line {}: SMILES: {} | Name: {}",
            record.line,
            record.smiles,
            record.name_or("(unnamed)")
        );
        match parse_smiles(&record.smiles) {
            Ok(_) => {
                valid += 1;
                println!("  - valid SMILES");
            }
            Err(_) => println!("  - invalid SMILES"),
        }
    }
    info!(
        "validated {}: {valid} valid, {} invalid",
        path.display(),
        records.len() - valid
    );
    Ok(())
}

/// Draws every valid molecule in the file into one tiled SVG, three cells
/// per row. Returns how many molecules made it into the grid; when none
/// do, no output file is written.
pub fn render_grid(path: &Path, output: &Path) -> Result<usize> {
    let records = read_records(path)?;

    let mut molecules = Vec::new();
    for record in &records {
        match Molecule::from_smiles(&record.smiles) {
            Ok(mut molecule) => {
                molecule.set_name(record.numbered_name());
                println!("Added molecule: {}", molecule.name());
                molecules.push(molecule);
            }
            Err(error) => {
                warn!("skipping line {}: {error:#}", record.line);
                println!("Invalid SMILES on line {}, skipped.", record.line);
            }
        }
    }

    if molecules.is_empty() {
        println!("No valid molecules found in the file.");
        return Ok(0);
    }
    show_grid(&molecules, output)?;
    Ok(molecules.len())
}

/// Visualizes a single molecule in 2D and 3D, writing the artifacts to
/// the current directory. `input` is either a SMILES string or a path to
/// a `.smi` file, in which case only the file's first record is used.
pub fn visualize_smiles(input: &str, name: &str, sdf_output: Option<&Path>) -> Result<()> {
    visualize_smiles_in(Path::new("."), input, name, sdf_output)
}

/// Same as [`visualize_smiles`] but with an explicit output directory for
/// the 2D and 3D artifacts.
pub fn visualize_smiles_in(
    out_dir: &Path,
    input: &str,
    name: &str,
    sdf_output: Option<&Path>,
) -> Result<()> {
    let (smiles, resolved_name) = if Path::new(input).exists() && input.ends_with(".smi") {
        match first_record(Path::new(input))? {
            Some(record) => {
                let resolved = record.name_or(name).to_string();
                (record.smiles, resolved)
            }
            None => {
                println!("File has no usable molecule line.");
                return Ok(());
            }
        }
    } else {
        (input.to_string(), name.to_string())
    };

    let mut molecule = match Molecule::from_smiles(&smiles) {
        Ok(molecule) => molecule,
        Err(error) => {
            info!("rejected SMILES {smiles}: {error:#}");
            println!("Invalid SMILES: {}. No molecule could be created.", smiles);
            return Ok(());
        }
    };
    molecule.set_name(resolved_name);
    molecule.add_hydrogens();

    // A failed conformer is not fatal here: the 2D depiction never needs
    // one and the 3D page degrades to whatever coordinates exist.
    if let Err(error) = embed_and_minimize(&mut molecule) {
        warn!("3D optimization failed: {error}");
        println!("Warning: problem during 3D optimization: {error:#}");
        println!("Continuing with the visualization...");
    }

    show_2d(&molecule, &out_dir.join("molecule_2d.svg"))?;
    show_3d(&molecule, &out_dir.join("molecule_3d.html"))?;

    if let Some(sdf_path) = sdf_output {
        let file = File::create(sdf_path)
            .with_context(|| format!("Failed to create {}", sdf_path.display()))?;
        let mut writer = SdfWriter::new(file);
        writer.write_molecule(&molecule)?;
        writer.finish()?;
        println!("Molecule exported as SDF to: {}", sdf_path.display());
    }
    Ok(())
}

fn embed_and_minimize(molecule: &mut Molecule) -> Result<(), EmbedError> {
    molecule.embed_3d(EMBED_SEED)?;
    let energy = molecule.minimize_energy()?;
    info!("minimized to energy {energy:.4}");
    Ok(())
}

/// Lists a file's valid molecules and lets the user pick one to visualize,
/// repeating until they cancel or decline to continue.
pub fn choose_molecule(path: &Path) -> Result<()> {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut output = std::io::stdout();
    choose_molecule_with(path, &mut input, &mut output, |record| {
        visualize_smiles(&record.smiles, &record.numbered_name(), None)
    })
}

/// The selection loop behind [`choose_molecule`], with the console and the
/// view action injected.
pub fn choose_molecule_with<R, W, F>(
    path: &Path,
    input: &mut R,
    output: &mut W,
    mut view: F,
) -> Result<()>
where
    R: BufRead,
    W: Write,
    F: FnMut(&Record) -> Result<()>,
{
    let records = read_records(path)?;
    let valid: Vec<Record> = records
        .into_iter()
        .filter(|record| parse_smiles(&record.smiles).is_ok())
        .collect();
    if valid.is_empty() {
        writeln!(output, "No valid molecules found in the file.")?;
        return Ok(());
    }

    list_molecules(output, &valid)?;
    loop {
        write!(
            output,
            "\nChoose a molecule (1-{}) or 0 to cancel: ",
            valid.len()
        )?;
        output.flush()?;
        let line = match read_prompt_line(input)? {
            Some(line) => line,
            None => {
                writeln!(output, "\nOperation cancelled.")?;
                return Ok(());
            }
        };
        if line == "0" {
            writeln!(output, "Operation cancelled.")?;
            return Ok(());
        }
        let choice = match line.parse::<usize>() {
            Ok(choice) => choice,
            Err(_) => {
                writeln!(output, "Invalid input. Enter a number.")?;
                continue;
            }
        };
        if choice < 1 || choice > valid.len() {
            writeln!(
                output,
                "Invalid choice. Enter a number between 1 and {}.",
                valid.len()
            )?;
            continue;
        }
        view(&valid[choice - 1])?;

        write!(output, "\nView another molecule? (y/n): ")?;
        output.flush()?;
        match read_prompt_line(input)? {
            Some(answer) if is_yes(&answer) => list_molecules(output, &valid)?,
            _ => return Ok(()),
        }
    }
}

fn list_molecules<W: Write>(output: &mut W, records: &[Record]) -> Result<()> {
    writeln!(output, "\nFound {} valid molecules:", records.len())?;
    for (index, record) in records.iter().enumerate() {
        writeln!(
            output,
            "{}. {} - {}",
            index + 1,
            record.numbered_name(),
            record.smiles
        )?;
    }
    Ok(())
}

fn read_prompt_line<R: BufRead>(input: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    let read = input.read_line(&mut line).context("Failed to read input")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Accepts Portuguese and English affirmative answers.
pub fn is_yes(answer: &str) -> bool {
    matches!(answer.to_lowercase().as_str(), "s" | "sim" | "y" | "yes")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStatus {
    Converted,
    InvalidSmiles(String),
    EmbedFailed(String),
}

/// What happened to one input record during batch conversion.
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub line: usize,
    pub smiles: String,
    pub name: String,
    pub status: RecordStatus,
}

/// Aggregate result of one batch conversion run.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub successes: usize,
    pub failures: usize,
    pub outcomes: Vec<RecordOutcome>,
}

impl BatchReport {
    fn record(&mut self, outcome: RecordOutcome) {
        match outcome.status {
            RecordStatus::Converted => self.successes += 1,
            _ => self.failures += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn total(&self) -> usize {
        self.successes + self.failures
    }
}

/// Converts every record in the input file into one multi-record SDF
/// file. Records whose SMILES fail to parse or whose conformer cannot be
/// generated are counted as failures and skipped; the input is read in
/// full before the output file is created, so a bad input path leaves no
/// partial output behind.
pub fn convert_to_sdf(input: &Path, output: &Path) -> Result<BatchReport> {
    let records = read_records(input)?;

    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut writer = SdfWriter::new(file);
    let mut report = BatchReport::default();

    for record in &records {
        let name = record.numbered_name();
        println!("Processing: {} - SMILES: {}", name, record.smiles);

        let mut molecule = match Molecule::from_smiles(&record.smiles) {
            Ok(molecule) => molecule,
            Err(error) => {
                info!("line {}: {error:#}", record.line);
                println!("  - invalid SMILES");
                report.record(RecordOutcome {
                    line: record.line,
                    smiles: record.smiles.clone(),
                    name,
                    status: RecordStatus::InvalidSmiles(format!("{error:#}")),
                });
                continue;
            }
        };
        molecule.set_name(name.clone());
        molecule.add_hydrogens();

        if let Err(error) = embed_and_minimize(&mut molecule) {
            warn!("line {}: {error}", record.line);
            println!("  - 3D conversion error: {error:#}");
            report.record(RecordOutcome {
                line: record.line,
                smiles: record.smiles.clone(),
                name,
                status: RecordStatus::EmbedFailed(error.to_string()),
            });
            continue;
        }

        writer.write_molecule(&molecule)?;
        println!("  - converted");
        report.record(RecordOutcome {
            line: record.line,
            smiles: record.smiles.clone(),
            name,
            status: RecordStatus::Converted,
        });
    }

    writer.finish()?;
    println!(
        "Conversion finished. Molecules converted: {}, failures: {}",
        report.successes, report.failures
    );
    println!("SDF file saved as: {}", output.display());
    Ok(report)
}

/// Convenience entry point: a `.smi` path opens the interactive picker,
/// anything else is treated as a SMILES string and visualized directly.
pub fn visualize_input(input: &str) -> Result<()> {
    let path = Path::new(input);
    if path.exists() && input.ends_with(".smi") {
        choose_molecule(path)
    } else {
        visualize_smiles(input, "Molécula", None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn write_input(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).expect("Failed to write input file");
        path
    }

    #[test]
    fn test_convert_reports_tallies() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let input = write_input(
            dir.path(),
            "mols.smi",
            "CCO Ethanol\nnot_a_smiles\nc1ccccc1 Benzene\n",
        );
        let output = dir.path().join("out.sdf");

        let report = convert_to_sdf(&input, &output).expect("Failed to convert");

        assert_eq!(report.successes, 2);
        assert_eq!(report.failures, 1);
        assert_eq!(report.total(), 3);
        assert!(matches!(
            report.outcomes[1].status,
            RecordStatus::InvalidSmiles(_)
        ));

        let sdf = std::fs::read_to_string(&output).expect("Failed to read SDF");
        assert_eq!(sdf.matches("$$$$").count(), 2);
        assert!(sdf.contains("Ethanol"));
        assert!(sdf.contains("Benzene"));
    }

    #[test]
    fn test_convert_missing_input_writes_nothing() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let output = dir.path().join("out.sdf");

        let result = convert_to_sdf(&dir.path().join("missing.smi"), &output);

        assert!(result.is_err());
        assert!(!output.exists());
    }

    #[test]
    fn test_validate_missing_file() {
        let error = validate_file(Path::new("definitely-not-here.smi")).unwrap_err();

        assert!(error.to_string().contains("not found"));
    }

    #[test]
    fn test_picker_rejects_bad_input_then_cancels() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let input = write_input(dir.path(), "mols.smi", "c1ccccc1 Benzene\nCCO\n");

        let mut console = Cursor::new(b"7\nabc\n0\n".to_vec());
        let mut transcript = Vec::new();
        let mut views = 0usize;
        choose_molecule_with(&input, &mut console, &mut transcript, |_| {
            views += 1;
            Ok(())
        })
        .expect("Selection loop failed");

        assert_eq!(views, 0);
        let text = String::from_utf8(transcript).expect("transcript was not UTF-8");
        assert!(text.contains("Found 2 valid molecules:"));
        assert!(text.contains("Invalid choice. Enter a number between 1 and 2."));
        assert!(text.contains("Invalid input. Enter a number."));
        assert!(text.contains("Operation cancelled."));
    }

    #[test]
    fn test_picker_views_selection() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let input = write_input(dir.path(), "mols.smi", "c1ccccc1 Benzene\nCCO\n");

        let mut console = Cursor::new(b"2\nn\n".to_vec());
        let mut transcript = Vec::new();
        let mut viewed = Vec::new();
        choose_molecule_with(&input, &mut console, &mut transcript, |record| {
            viewed.push(record.smiles.clone());
            Ok(())
        })
        .expect("Selection loop failed");

        assert_eq!(viewed, vec!["CCO".to_string()]);
        let text = String::from_utf8(transcript).expect("transcript was not UTF-8");
        assert!(text.contains("1. Benzene - c1ccccc1"));
        assert!(text.contains("2. Molécula 2 - CCO"));
    }

    #[test]
    fn test_picker_relists_after_yes() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let input = write_input(dir.path(), "mols.smi", "c1ccccc1 Benzene\nCCO\n");

        let mut console = Cursor::new(b"1\ns\n2\nn\n".to_vec());
        let mut transcript = Vec::new();
        let mut viewed = Vec::new();
        choose_molecule_with(&input, &mut console, &mut transcript, |record| {
            viewed.push(record.smiles.clone());
            Ok(())
        })
        .expect("Selection loop failed");

        assert_eq!(viewed, vec!["c1ccccc1".to_string(), "CCO".to_string()]);
        let text = String::from_utf8(transcript).expect("transcript was not UTF-8");
        assert_eq!(text.matches("Found 2 valid molecules:").count(), 2);
    }

    #[test]
    fn test_picker_handles_eof() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let input = write_input(dir.path(), "mols.smi", "CCO\n");

        let mut console = Cursor::new(Vec::new());
        let mut transcript = Vec::new();
        let mut views = 0usize;
        choose_molecule_with(&input, &mut console, &mut transcript, |_| {
            views += 1;
            Ok(())
        })
        .expect("Selection loop failed");

        assert_eq!(views, 0);
        let text = String::from_utf8(transcript).expect("transcript was not UTF-8");
        assert!(text.contains("Operation cancelled."));
    }

    #[test]
    fn test_picker_skips_invalid_records() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let input = write_input(dir.path(), "mols.smi", "garbage]]\nCCO Ethanol\n");

        let mut console = Cursor::new(b"1\nn\n".to_vec());
        let mut transcript = Vec::new();
        let mut viewed = Vec::new();
        choose_molecule_with(&input, &mut console, &mut transcript, |record| {
            viewed.push(record.smiles.clone());
            Ok(())
        })
        .expect("Selection loop failed");

        assert_eq!(viewed, vec!["CCO".to_string()]);
        let text = String::from_utf8(transcript).expect("transcript was not UTF-8");
        assert!(text.contains("Found 1 valid molecules:"));
    }

    #[test]
    fn test_grid_with_no_valid_molecules() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let input = write_input(dir.path(), "mols.smi", "garbage]]\nalso&bad\n");
        let output = dir.path().join("grid.svg");

        let count = render_grid(&input, &output).expect("Failed to scan file");

        assert_eq!(count, 0);
        assert!(!output.exists());
    }

    #[test]
    fn test_grid_renders_valid_molecules() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let input = write_input(dir.path(), "mols.smi", "CCO\nc1ccccc1 Benzene\nbad&smiles\n");
        let output = dir.path().join("grid.svg");

        let count = render_grid(&input, &output).expect("Failed to render grid");

        assert_eq!(count, 2);
        let svg = std::fs::read_to_string(&output).expect("Failed to read grid");
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("Molécula 1"));
        assert!(svg.contains("Benzene"));
    }

    #[test]
    fn test_visualize_creates_artifacts() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let sdf = dir.path().join("out.sdf");

        visualize_smiles_in(dir.path(), "CCO", "Etanol", Some(&sdf))
            .expect("Failed to visualize");

        let svg = std::fs::read_to_string(dir.path().join("molecule_2d.svg"))
            .expect("Failed to read depiction");
        assert!(svg.starts_with("<svg"));
        let page = std::fs::read_to_string(dir.path().join("molecule_3d.html"))
            .expect("Failed to read viewer page");
        assert!(page.contains("Etanol"));
        let record = std::fs::read_to_string(&sdf).expect("Failed to read SDF");
        assert!(record.starts_with("Etanol\n"));
    }

    #[test]
    fn test_visualize_rejects_invalid_smiles_without_output() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");

        visualize_smiles_in(dir.path(), "xyz123", "Bad", None).expect("Expected a clean return");

        assert!(!dir.path().join("molecule_2d.svg").exists());
        assert!(!dir.path().join("molecule_3d.html").exists());
    }

    #[test]
    fn test_visualize_uses_first_file_record() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let input = write_input(dir.path(), "mols.smi", "CCO Etanol\nc1ccccc1 Benzeno\n");

        visualize_smiles_in(
            dir.path(),
            input.to_str().expect("path was not UTF-8"),
            "fallback",
            None,
        )
        .expect("Failed to visualize");

        let page = std::fs::read_to_string(dir.path().join("molecule_3d.html"))
            .expect("Failed to read viewer page");
        assert!(page.contains("Etanol"));
        assert!(!page.contains("Benzeno"));
    }

    #[test]
    fn test_visualize_input_rejects_garbage_cleanly() {
        assert!(visualize_input("]]not-a-molecule[[").is_ok());
    }
}
