use clap::{Parser, Subcommand};
use nexuslite_repository::geo::{Circle, Distance, GeoBox, Point, Polygon};
use nexuslite_repository::query::{CompiledQuery, MethodSignature, Param, ParamKind, PageRequest, ResultShape, Sort};
use nexuslite_repository::schema::EntitySchema;
use nexuslite_repository::utils::json::json_to_bson;
use nexuslite_repository::{DbError, RepositoryConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "nexusrepo", version, about = "Compile and inspect derived repository query methods", long_about = None)]
struct Cli {
    #[arg(long, help = "Repository config file (TOML). Its [logging] section configures log output.")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Compile one method and print its store predicate, sort and result shape as JSON")]
    Explain {
        #[arg(long, help = "Entity schema file (.toml or .json)")]
        schema: PathBuf,
        #[arg(help = "Method name, e.g. findByLastnameOrderByAgeDesc")]
        method: String,
        #[arg(long, value_delimiter = ',', value_parser = parse_kind, help = "Parameter kinds, e.g. value,sequence,point,distance,sort,page")]
        params: Vec<ParamKind>,
        #[arg(long, value_parser = parse_shape, help = "Declared result shape (list, one, count, exists, page, geo_results, geo_page)")]
        returns: Option<ResultShape>,
        #[arg(long, help = "JSON array of arguments for the non-Sort/Page parameters; renders the bound predicate")]
        args: Option<String>,
    },
    #[command(about = "Compile every method declared in a TOML file; exits non-zero on any failure")]
    Check {
        #[arg(long, help = "Entity schema file (.toml or .json)")]
        schema: PathBuf,
        #[arg(help = "TOML file with [[method]] tables")]
        methods: PathBuf,
    },
}

// Same snake_case names the method files use
fn parse_kind(s: &str) -> Result<ParamKind, String> {
    serde_json::from_value(serde_json::Value::String(s.trim().to_string())).map_err(|e| e.to_string())
}

fn parse_shape(s: &str) -> Result<ResultShape, String> {
    serde_json::from_value(serde_json::Value::String(s.trim().to_string())).map_err(|e| e.to_string())
}

#[derive(Deserialize)]
struct MethodFile {
    #[serde(default)]
    method: Vec<MethodSignature>,
}

fn load_schema(path: &Path) -> Result<EntitySchema, DbError> {
    let text = std::fs::read_to_string(path)?;
    if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json")) {
        Ok(serde_json::from_str(&text)?)
    } else {
        toml::from_str(&text).map_err(|e| DbError::Config(format!("{}: {e}", path.display())))
    }
}

fn point(v: &serde_json::Value) -> Option<Point> {
    let a = v.as_array()?;
    match a.as_slice() {
        [x, y] => Some(Point::new(x.as_f64()?, y.as_f64()?)),
        _ => None,
    }
}

/// Turn a JSON argument into the parameter `kind` expects.
fn json_arg(kind: ParamKind, v: &serde_json::Value) -> Result<Param, DbError> {
    let bad = || DbError::Config(format!("argument {v} does not fit a {kind:?} parameter"));
    Ok(match kind {
        ParamKind::Value | ParamKind::Sequence => Param::Value(json_to_bson(v.clone()).map_err(|_| bad())?),
        ParamKind::Point => Param::Point(point(v).ok_or_else(bad)?),
        ParamKind::Distance => Param::Distance(Distance::new(v.as_f64().ok_or_else(bad)?)),
        ParamKind::Circle => match v.as_array().map(Vec::as_slice) {
            Some([c, r]) => {
                let c = point(c).ok_or_else(bad)?;
                Circle::new(c.x, c.y, r.as_f64().ok_or_else(bad)?).into()
            }
            _ => return Err(bad()),
        },
        ParamKind::Box => match v.as_array().map(Vec::as_slice) {
            Some([a, b]) => GeoBox::new(point(a).ok_or_else(bad)?, point(b).ok_or_else(bad)?).into(),
            _ => return Err(bad()),
        },
        ParamKind::Polygon => {
            let pts = v.as_array().ok_or_else(bad)?.iter().map(point).collect::<Option<Vec<_>>>().ok_or_else(bad)?;
            Polygon::new(pts).into()
        }
        ParamKind::Sort | ParamKind::Page => return Err(bad()),
    })
}

fn bind_args(sig: &MethodSignature, json: &str) -> Result<Vec<Param>, DbError> {
    let values: Vec<serde_json::Value> = serde_json::from_str(json)?;
    let mut values = values.iter();
    sig.params()
        .iter()
        .map(|kind| match kind {
            ParamKind::Sort => Ok(Param::Sort(Sort::default())),
            ParamKind::Page => PageRequest::new(0, 20)
                .map(Param::Page)
                .ok_or_else(|| DbError::Config("page size".into())),
            other => {
                let v = values.next().ok_or_else(|| DbError::Config(format!("missing argument for {other:?}")))?;
                json_arg(*other, v)
            }
        })
        .collect()
}

fn explain(
    schema: &EntitySchema,
    sig: &MethodSignature,
    args: Option<&str>,
    cfg: &RepositoryConfig,
) -> Result<serde_json::Value, DbError> {
    let compiled = CompiledQuery::compile(sig, schema)?;
    let mut out = compiled.describe();
    if let Some(json) = args {
        let spec = compiled.bind(&bind_args(sig, json)?, cfg.max_in_set)?;
        let filter = bson::Bson::Document(spec.filter().to_document()).into_relaxed_extjson();
        out["filter"] = filter;
        out["fingerprint"] = serde_json::json!(spec.filter().fingerprint());
        out["options"] = serde_json::to_value(spec.find_options())?;
    }
    Ok(out)
}

fn run(cli: Cli) -> Result<bool, DbError> {
    let cfg = match &cli.config {
        Some(p) => RepositoryConfig::load(p)?.with_env_overrides()?,
        None => RepositoryConfig::default().with_env_overrides()?,
    };
    if let Err(e) = nexuslite_repository::logger::configure_from_config(&cfg.logging) {
        eprintln!("logging disabled: {e}");
    }
    match cli.command {
        Commands::Explain { schema, method, params, returns, args } => {
            let schema = load_schema(&schema)?;
            let mut sig = MethodSignature::new(method, params).for_entity(schema.name.clone());
            if let Some(r) = returns {
                sig = sig.returns(r);
            }
            let out = explain(&schema, &sig, args.as_deref(), &cfg)?;
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(true)
        }
        Commands::Check { schema, methods } => {
            let schema = load_schema(&schema)?;
            let text = std::fs::read_to_string(&methods)?;
            let file: MethodFile =
                toml::from_str(&text).map_err(|e| DbError::Config(format!("{}: {e}", methods.display())))?;
            let mut failures = 0usize;
            for sig in file.method {
                let sig = sig.for_entity(schema.name.clone());
                match CompiledQuery::compile(&sig, &schema) {
                    Ok(_) => println!("ok    {sig}"),
                    Err(e) => {
                        failures += 1;
                        println!("FAIL  {sig}: {e}");
                    }
                }
            }
            if failures > 0 {
                eprintln!("{failures} method(s) failed to compile");
            }
            Ok(failures == 0)
        }
    }
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}
