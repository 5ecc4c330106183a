use std::path::PathBuf;

use console::Style;
use skymap_core::consts::ARCSEC;
use skymap_core::instrument::Instrument;
use skymap_core::pipeline::config::{ModelKind, ReductionConfig};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

pub fn print_reduction_summary(config: &ReductionConfig, instrument: &Instrument, files: &[PathBuf]) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Sky Map Reduction"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(17)));
    println!();

    // Inputs
    for (i, file) in files.iter().enumerate() {
        let label = if i == 0 { "Scans" } else { "" };
        println!("  {:<14}{}", s.label.apply_to(label), s.path.apply_to(file.display()));
    }
    println!(
        "  {:<14}{}",
        s.label.apply_to("Instrument"),
        s.value.apply_to(format!(
            "{} ({} channels, {:.1}\" beam)",
            instrument.name,
            instrument.channel_count(),
            instrument.resolution / ARCSEC
        ))
    );
    let threads = match config.threads {
        Some(n) => n.to_string(),
        None => "per core".to_string(),
    };
    println!("  {:<14}{}", s.label.apply_to("Threads"), s.value.apply_to(threads));
    println!();

    // Model
    println!("  {}", s.header.apply_to("Model"));
    println!("    {:<12}{}", s.label.apply_to("Type"), s.method.apply_to(config.model));
    if config.model == ModelKind::Spectral {
        let spectral = &config.spectral;
        let axis = if spectral.wavelength { "wavelength" } else { "frequency" };
        let scale = if spectral.logarithmic { "log" } else { "linear" };
        println!("    {:<12}{}", s.label.apply_to("Axis"), s.value.apply_to(format!("{axis}, {scale}")));
    }
    println!("    {:<12}{}", s.label.apply_to("Partition"), s.method.apply_to(config.partition));
    let resolution = match config.grid.resolution {
        Some(arcsec) => format!("{arcsec}\""),
        None => "beam / 5".to_string(),
    };
    println!("    {:<12}{}", s.label.apply_to("Resolution"), s.value.apply_to(resolution));
    if let Some([w, h]) = config.grid.fixed_size {
        println!("    {:<12}{}", s.label.apply_to("Size"), s.value.apply_to(format!("{w}\" x {h}\"")));
    }
    println!("    {:<12}{}", s.label.apply_to("Rounds"), s.value.apply_to(config.rounds));
    println!();

    // Processing
    println!("  {}", s.header.apply_to("Processing"));
    match config.smoothing {
        Some(spec) => println!("    {:<12}{}", s.label.apply_to("Smoothing"), s.method.apply_to(spec)),
        None => println!("    {:<12}{}", s.label.apply_to("Smoothing"), s.disabled.apply_to("disabled")),
    }
    match &config.filter {
        Some(filter) => {
            let fwhm = filter
                .fwhm
                .map_or_else(|| "5 x source".to_string(), |f| format!("{f}\""));
            println!(
                "    {:<12}{}",
                s.label.apply_to("Filter"),
                s.method.apply_to(format!("{} ({fwhm})", filter.mode))
            );
        }
        None => println!("    {:<12}{}", s.label.apply_to("Filter"), s.disabled.apply_to("disabled")),
    }
    match config.blanking.level {
        Some(level) => println!(
            "    {:<12}{}",
            s.label.apply_to("Blanking"),
            s.value.apply_to(format!(
                "{level} sigma, {} ({} of {})",
                config.blanking.sign, config.blanking.min_neighbors, config.blanking.connectivity
            ))
        ),
        None => println!("    {:<12}{}", s.label.apply_to("Blanking"), s.disabled.apply_to("disabled")),
    }
    if let Some(method) = config.scan_weighting {
        println!("    {:<12}{}", s.label.apply_to("Weighting"), s.method.apply_to(method));
    }
    if let Some(coupling) = &config.coupling {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Coupling"),
            s.value.apply_to(format!("[{}, {}]", coupling.min, coupling.max))
        );
    }
    match &config.pointing {
        Some(p) => println!(
            "    {:<12}{}",
            s.label.apply_to("Pointing"),
            s.method.apply_to(format!("{} {} (S/N > {})", p.method, p.kind, p.significance))
        ),
        None => println!("    {:<12}{}", s.label.apply_to("Pointing"), s.disabled.apply_to("disabled")),
    }
    println!();

    // Memory
    let budget = match config.memory.max_bytes {
        Some(max) => format!("{:.1} MB", max as f64 / (1024.0 * 1024.0)),
        None => "unlimited".to_string(),
    };
    println!("  {:<14}{}", s.header.apply_to("Memory"), s.value.apply_to(budget));
    println!();
}
