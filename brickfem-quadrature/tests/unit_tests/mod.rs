mod simplex;
mod univariate;
