use std::env;

use log::info;
use rs_markov_core::io::snapshot_path;
use rs_markov_core::model::chain::MarkovChain;
use rs_markov_core::source::{Folding, Symbols, TextSource, Unit};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Usage: rs-markov-exemple <input.txt> [order] [count] [chars|words]
    let args: Vec<String> = env::args().collect();
    let input = match args.get(1) {
        Some(input) => input.clone(),
        None => return Err("Usage: rs-markov-exemple <input.txt> [order] [count] [chars|words]".into()),
    };
    let order: usize = args.get(2).map(|s| s.parse()).transpose()?.unwrap_or(3);
    let count: usize = args.get(3).map(|s| s.parse()).transpose()?.unwrap_or(200);
    let unit = match args.get(4).map(String::as_str) {
        None | Some("chars") => Unit::Chars,
        Some("words") => Unit::Words,
        Some(other) => return Err(format!("Unknown unit {:?}, expected 'chars' or 'words'", other).into()),
    };

    println!("Ich bin nicht Schiller!");

    // Whitespace is folded so line breaks do not dominate the model
    let source = TextSource::new(Folding::Whitespace);

    // The snapshot sits next to the input: data/input.txt -> data/input-3.chain
    // Words get their own snapshot since symbol types cannot be mixed
    let mut snapshot = snapshot_path(&input, order)?.to_string_lossy().to_string();
    if unit == Unit::Words {
        snapshot.push_str(".words");
    }

    match source.read(&input, unit)? {
        Symbols::Chars(chars) => {
            let mut chain = MarkovChain::<char>::open(&snapshot, Some(order))?;
            learn_if_empty(&mut chain, chars, &snapshot)?;
            chain.set_random_state()?;
            let text = chain.emit().take(count).collect::<Result<String, _>>()?;
            println!("{}", text);
        }
        Symbols::Words(words) => {
            let mut chain = MarkovChain::<String>::open(&snapshot, Some(order))?;
            learn_if_empty(&mut chain, words, &snapshot)?;
            chain.set_random_state()?;
            let text = chain.emit().take(count).collect::<Result<Vec<_>, _>>()?;
            println!("{}", text.join(" "));
        }
    }

    Ok(())
}

/// Learns `symbols` and writes the snapshot, unless it was already loaded.
fn learn_if_empty<S: rs_markov_core::model::symbol::Symbol>(
    chain: &mut MarkovChain<S>,
    symbols: Vec<S>,
    snapshot: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if chain.graph_mut().vertex_count()? > 0 {
        info!("Reading from {}", snapshot);
        return Ok(());
    }

    info!("Learning {} symbols", symbols.len());
    chain.learn(symbols)?;
    chain.flush(None)?;
    info!("Done learning, saved to {}", snapshot);
    Ok(())
}
