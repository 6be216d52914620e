use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::Result;

use smiview::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    VisualizeSmiles,
    ValidateFile,
    ConvertToSdf,
    RenderGrid,
    ChooseMolecule,
    Quit,
}

enum Flow {
    Continue,
    Quit,
}

impl Command {
    fn from_choice(choice: &str) -> Option<Self> {
        match choice {
            "1" => Some(Self::VisualizeSmiles),
            "2" => Some(Self::ValidateFile),
            "3" => Some(Self::ConvertToSdf),
            "4" => Some(Self::RenderGrid),
            "5" => Some(Self::ChooseMolecule),
            "6" => Some(Self::Quit),
            _ => None,
        }
    }

    fn run(self) -> Result<Flow> {
        match self {
            Self::VisualizeSmiles => {
                let Some(input) = prompt("Enter the molecule SMILES: ")? else {
                    return Ok(Flow::Quit);
                };
                if input.is_empty() {
                    println!("Nothing entered.");
                    return Ok(Flow::Continue);
                }
                let Some(name) = prompt("Molecule name (optional): ")? else {
                    return Ok(Flow::Quit);
                };
                let name = if name.is_empty() {
                    "Molécula".to_string()
                } else {
                    name
                };
                let Some(save) = prompt("Save the molecule as .sdf? (y/n): ")? else {
                    return Ok(Flow::Quit);
                };
                let sdf_path = if is_yes(&save) {
                    let Some(path) =
                        prompt(&format!("Output file name [{DEFAULT_SDF_OUTPUT}]: "))?
                    else {
                        return Ok(Flow::Quit);
                    };
                    Some(if path.is_empty() {
                        DEFAULT_SDF_OUTPUT.to_string()
                    } else {
                        path
                    })
                } else {
                    None
                };
                visualize_smiles(&input, &name, sdf_path.as_deref().map(Path::new))?;
                Ok(Flow::Continue)
            }
            Self::ValidateFile => {
                let Some(path) = prompt("Enter the .smi file path: ")? else {
                    return Ok(Flow::Quit);
                };
                validate_file(Path::new(&path))?;
                Ok(Flow::Continue)
            }
            Self::ConvertToSdf => {
                let Some(input) = prompt("Enter the .smi file path: ")? else {
                    return Ok(Flow::Quit);
                };
                let Some(output) =
                    prompt(&format!("Output file name [{DEFAULT_BATCH_OUTPUT}]: "))?
                else {
                    return Ok(Flow::Quit);
                };
                let output = if output.is_empty() {
                    DEFAULT_BATCH_OUTPUT.to_string()
                } else {
                    output
                };
                convert_to_sdf(Path::new(&input), Path::new(&output))?;
                Ok(Flow::Continue)
            }
            Self::RenderGrid => {
                let Some(path) = prompt("Enter the .smi file path: ")? else {
                    return Ok(Flow::Quit);
                };
                render_grid(Path::new(&path), Path::new(DEFAULT_GRID_OUTPUT))?;
                Ok(Flow::Continue)
            }
            Self::ChooseMolecule => {
                let Some(path) = prompt("Enter the .smi file path: ")? else {
                    return Ok(Flow::Quit);
                };
                choose_molecule(Path::new(&path))?;
                Ok(Flow::Continue)
            }
            Self::Quit => {
                println!("Exiting...");
                Ok(Flow::Quit)
            }
        }
    }
}

fn prompt(message: &str) -> Result<Option<String>> {
    print!("{message}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    let read = std::io::stdin().lock().read_line(&mut line)?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn print_menu() {
    println!("\n--- Molecule Viewer ---");
    println!("1. Visualize a molecule from SMILES");
    println!("2. Validate a .smi file");
    println!("3. Convert a .smi file to SDF");
    println!("4. Draw all molecules in a .smi file as a grid");
    println!("5. Choose a molecule from a .smi file");
    println!("6. Exit");
}

fn main() -> Result<()> {
    init_logging("info");

    loop {
        print_menu();
        let Some(choice) = prompt("Choose an option (1-6): ")? else {
            break;
        };
        let Some(command) = Command::from_choice(&choice) else {
            println!("Invalid option. Try again.");
            continue;
        };
        // Operation failures are reported and the menu continues; only
        // an explicit exit or end of input leaves the loop.
        match command.run() {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(error) => eprintln!("Unexpected error: {error:#}"),
        }
    }
    Ok(())
}
