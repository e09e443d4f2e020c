use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process;

use brains::prelude::*;
use tracing::info;

const IMAGE_LABELS: [(u32, OutputId); 2] = [(14, 0), (23, 1)];

#[derive(Debug, Default)]
struct Options {
    epochs: u64,
    export: Option<PathBuf>,
    warp: bool,
    positional: Vec<String>,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" || args[1] == "help" {
        print_help();
        return;
    }

    let opts = match parse_options(&args[2..]) {
        Ok(opts) => opts,
        Err(msg) => {
            eprintln!("{}", msg);
            print_help();
            process::exit(2);
        }
    };

    let required = match args[1].as_str() {
        "image" => 1,
        "import" => 2,
        _ => 0,
    };
    if opts.positional.len() < required {
        eprintln!("{} needs {} argument(s)", args[1], required);
        print_help();
        process::exit(2);
    }

    let result = match args[1].as_str() {
        "stdp" => run_stdp(&opts),
        "easy" => run_easy(&opts),
        "image" => run_image(&opts),
        "import" => run_import(&opts),
        other => {
            eprintln!("Unknown command: {}", other);
            print_help();
            process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn print_help() {
    println!("brains (spiking cell network demos)");
    println!("usage:");
    println!("  brains stdp              [options]");
    println!("  brains easy              [options]");
    println!("  brains image <csv>       [options]");
    println!("  brains import <file> <world>");
    println!("       world: stdp | easy | <csv> for image classification");
    println!("options:");
    println!("  --epochs N       epochs to run (default 100)");
    println!("  --export <file>  write the trained model (.bin for a binary image, JSON otherwise)");
    println!("  --warp           skip idle stretches");
}

fn parse_options(args: &[String]) -> Result<Options, String> {
    let mut opts = Options {
        epochs: 100,
        ..Default::default()
    };
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--epochs" => {
                let value = it.next().ok_or("--epochs needs a value")?;
                opts.epochs = value.parse().map_err(|e| format!("bad --epochs {:?}: {}", value, e))?;
            }
            "--export" => {
                let value = it.next().ok_or("--export needs a file")?;
                opts.export = Some(PathBuf::from(value));
            }
            "--warp" => opts.warp = true,
            flag if flag.starts_with("--") => return Err(format!("Unknown option: {}", flag)),
            _ => opts.positional.push(arg.clone()),
        }
    }
    Ok(opts)
}

fn run_stdp(opts: &Options) -> brains::error::Result<()> {
    let cells = vec![
        CellDefinition::new("a").at(0, 0).input(0, 0),
        CellDefinition::new("b").at(1, 0).input(1, 0),
        CellDefinition::new("c").at(0, 2),
    ];
    let network = NetworkDefinition::from_cells(cells, &[("a", "c", 0.026), ("b", "c", 0.026)]);
    let params = ModelParameters::stdp().with_warp(opts.warp);
    let mut env = StdpEnvironment::new(params.epoch_length, params.epoch_delay);
    let mut sim = Simulation::new(params, network)?;
    drive(&mut sim, &mut env, opts)
}

fn easy_network() -> NetworkDefinition {
    let layers = [
        LayerDefinition::new("a", 3, CellType::Excitatory)
            .with_layout(Layout::Line)
            .as_input()
            .with_output_balance(true),
        LayerDefinition::new("i", 3, CellType::Inhibitory)
            .with_layout(Layout::Line)
            .as_input()
            .with_output_balance(true),
        LayerDefinition::new("b", 4, CellType::Excitatory)
            .with_layout(Layout::Line)
            .with_target_fire_rate(0.25)
            .with_output_balance(true),
        LayerDefinition::new("c", 2, CellType::Excitatory)
            .with_layout(Layout::Line)
            .as_output()
            .with_target_fire_rate(0.5)
            .with_output_balance(true),
    ];
    let connections = [
        LayerConnection::new("a", "b", 1.0, 0.1),
        LayerConnection::new("i", "b", 1.0, 0.1),
        LayerConnection::new("b", "c", 1.0, 0.45),
    ];
    NetworkDefinition::from_layers(&layers, &connections, 1)
}

fn reward_params(opts: &Options) -> ModelParameters {
    let mut params = ModelParameters::handwriting(100, 10).with_warp(opts.warp);
    params.synapse_type_parameters.max_strength = 0.4;
    params
}

fn run_easy(opts: &Options) -> brains::error::Result<()> {
    let params = reward_params(opts);
    let mut env = EasyEnvironment::new(params.epoch_length, params.epoch_delay, 7);
    let mut sim = Simulation::new(params, easy_network())?;
    drive(&mut sim, &mut env, opts)
}

fn image_network(width: usize) -> NetworkDefinition {
    let layers = [
        LayerDefinition::new("a", width * width, CellType::Excitatory).as_input(),
        LayerDefinition::new("b", 20, CellType::Excitatory)
            .with_layout(Layout::Line)
            .with_target_fire_rate(1.0)
            .with_output_balance(true),
        LayerDefinition::new("c", IMAGE_LABELS.len(), CellType::Excitatory)
            .with_layout(Layout::Line)
            .as_output()
            .with_target_fire_rate(0.5)
            .with_output_balance(true),
    ];
    let connections = [
        LayerConnection::new("a", "b", 0.1, 0.01),
        LayerConnection::new("b", "c", 1.0, 0.1),
    ];
    NetworkDefinition::from_layers(&layers, &connections, 1)
}

fn run_image(opts: &Options) -> brains::error::Result<()> {
    let csv = opts.positional[0].as_str();
    let params = reward_params(opts);
    let mut env = ImageEnvironment::from_path(csv, &IMAGE_LABELS, Some(1), params.epoch_length, params.epoch_delay)?;
    info!("Loaded {} images of width {} from {}", env.len(), env.width(), csv);
    let mut sim = Simulation::new(params, image_network(env.width()))?;
    drive(&mut sim, &mut env, opts)
}

fn run_import(opts: &Options) -> brains::error::Result<()> {
    let file = opts.positional[0].as_str();
    let world = opts.positional[1].as_str();

    let mut sim = load_model(Path::new(file))?;
    info!("Imported model from {}", file);

    let (len, delay) = (sim.params().epoch_length, sim.params().epoch_delay);
    let mut env: Box<dyn Environment> = match world {
        "stdp" => Box::new(StdpEnvironment::new(len, delay)),
        "easy" => Box::new(EasyEnvironment::new(len, delay, 7)),
        csv => Box::new(ImageEnvironment::from_path(csv, &IMAGE_LABELS, Some(1), len, delay)?),
    };
    drive(&mut sim, env.as_mut(), opts)
}

fn is_binary_image(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "bin")
}

fn load_model(path: &Path) -> brains::error::Result<Simulation> {
    if is_binary_image(path) {
        let mut reader = BufReader::new(File::open(path)?);
        Simulation::load_image_from(&mut reader)
    } else {
        Simulation::from_json(&std::fs::read_to_string(path)?)
    }
}

fn save_model(sim: &Simulation, path: &Path) -> brains::error::Result<()> {
    if is_binary_image(path) {
        let mut writer = BufWriter::new(File::create(path)?);
        sim.save_image_to(&mut writer)?;
    } else {
        std::fs::write(path, sim.export_json()?)?;
    }
    info!("Model exported to {:?}", path);
    Ok(())
}

/// Run `opts.epochs` epochs, printing the score and balance summary after each.
fn drive<E: Environment + ?Sized>(sim: &mut Simulation, env: &mut E, opts: &Options) -> brains::error::Result<()> {
    let len = sim.params().epoch_length;
    let delay = sim.params().epoch_delay;

    for epoch in 0..opts.epochs {
        let start = if epoch == 0 { 0 } else { delay + epoch * len };
        let end = delay + (epoch + 1) * len;
        let fired = run_steps(sim, env, start..end);

        let adapter = SimulationAdapter::new(sim);
        match env.results() {
            Some(results) => println!("epoch {} outputs={} {}", epoch, fired, results),
            None => println!("epoch {} outputs={}", epoch, fired),
        }
        for line in adapter.text_lines() {
            println!("  {}", line);
        }
        if sim.synapses().len() <= 4 {
            for view in adapter.synapse_views() {
                println!("  {} strength={:.5}", view.label, view.strength);
            }
        }
    }

    if let Some(results) = env.results() {
        println!("final win_rate={:.3}", results.win_rate());
    }
    if let Some(path) = &opts.export {
        save_model(sim, path)?;
    }
    Ok(())
}
