use std::collections::{BTreeMap, HashMap};

#[derive(serde::Deserialize)]
struct Record {
    at_ms: f64,
    kind: String,
    unit: Option<u32>,
    worker: Option<u32>,
    depth: Option<usize>,
}

fn main() {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "analysis/traces/trace.csv".to_string());
    let records = load_csv(&path);

    let mut entered = HashMap::new();
    let mut started = HashMap::new();
    let mut finished: HashMap<u32, usize> = HashMap::new();
    let mut entry_order = Vec::new();
    let mut start_order = Vec::new();
    let mut per_pump: BTreeMap<u32, usize> = BTreeMap::new();
    let mut abandoned = 0;
    let mut peak_depth = 0;
    let mut final_depth = None;

    for r in &records {
        match r.kind.as_str() {
            "arrival-entered" => {
                let unit = r.unit.unwrap();
                entered.insert(unit, r.at_ms);
                entry_order.push(unit);
                peak_depth = peak_depth.max(r.depth.unwrap_or(0));
            }
            "arrival-abandoned" => abandoned += 1,
            "unit-dequeued" => final_depth = r.depth,
            "service-started" => {
                let unit = r.unit.unwrap();
                started.insert(unit, r.at_ms);
                start_order.push(unit);
            }
            "service-finished" => {
                *finished.entry(r.unit.unwrap()).or_default() += 1;
                *per_pump.entry(r.worker.unwrap()).or_default() += 1;
            }
            _ => {}
        }
    }

    let duplicates = finished.values().filter(|&&n| n > 1).count();
    let missing = entered.keys().filter(|u| !finished.contains_key(u)).count();

    // Units whose service started ahead of a unit that entered earlier.
    let position: HashMap<u32, usize> = entry_order
        .iter()
        .enumerate()
        .map(|(i, u)| (*u, i))
        .collect();
    let overtakes = start_order
        .windows(2)
        .filter(|w| position.get(&w[0]) > position.get(&w[1]))
        .count();

    let waits: Vec<f64> = started
        .iter()
        .filter_map(|(u, s)| entered.get(u).map(|e| s - e))
        .collect();
    let mean_wait = if waits.is_empty() {
        0.0
    } else {
        waits.iter().sum::<f64>() / waits.len() as f64
    };

    let verdict = |n: usize| if n == 0 { "ok" } else { "VIOLATED" };

    println!("--- Summary ---");
    println!();
    println!("{} cars entered, {} left without entering", entered.len(), abandoned);
    println!("peak waiting area depth: {peak_depth}");
    if let Some(depth) = final_depth {
        println!("waiting area depth after last dequeue: {depth}");
    }
    println!("mean wait before service: {mean_wait:.1}ms");
    println!();
    println!("no duplicated service: {} ({duplicates})", verdict(duplicates));
    println!("no lost service: {} ({missing})", verdict(missing));
    println!(
        "service order overtakes: {overtakes}{}",
        if per_pump.len() > 1 {
            " (expected with more than one pump)"
        } else {
            ""
        }
    );
    println!();
    for (pump, n) in &per_pump {
        println!("Pump {pump}: {n} cars");
    }
}

fn load_csv(path: &str) -> Vec<Record> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let list: Result<Vec<Record>, _> = reader.deserialize().collect();
    list.unwrap()
}
