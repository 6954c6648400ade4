// Module synthèse - Click sounds rendered by the mixer

pub mod click;
